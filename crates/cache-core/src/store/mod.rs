//! The cache store: two-phase lookup, dedup-aware store, parallel restore.
//!
//! A blocking store handle (constructor, `open`/`open_default`) over one
//! cache root; every operation is synchronous since the only concurrency
//! this engine needs is bounded parallel copies during restore.

mod lookup;
mod restore;
mod save;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::cache_key::CacheKey;
use crate::error::{CacheError, Result};
use crate::file_metadata::FileMetadata;
use crate::folder_index::FolderIndex;
use crate::repo_path::RepoPath;

pub use lookup::LookupHit;
pub use restore::RestoreOutcome;

/// The number of restore worker threads when the caller doesn't specify
/// one. Artifact copies are I/O-bound, so this is sized well above the
/// typical core count rather than matched to it.
pub const DEFAULT_RESTORE_WORKERS: usize = 8;

pub const METADATA_FILE_NAME: &str = "metadata.json";

/// On-disk shape of a single `entry_NNNNNN/metadata.json`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EntryMetadata {
    pub cache_key: String,
    pub source_file: RepoPath,
    pub tool_name: String,
    pub tool_args: Vec<String>,
    pub main_file_path: RepoPath,
    pub dependencies: Vec<FileMetadata>,
    /// Artifact paths, repo-relative, sorted for reproducibility.
    pub files: Vec<RepoPath>,
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
    /// Absolute repo root at capture time, used by `PathTranslator` on a
    /// later restore from a different location. Empty for legacy entries
    /// missing the field — an empty path is not a usable "old root" for
    /// translation, so callers resolve it against the *current* repo root
    /// via [`EntryMetadata::repo_dir_or`] rather than reading this field
    /// directly.
    #[serde(default)]
    pub repo_dir: PathBuf,
}

impl EntryMetadata {
    /// `repo_dir` as it was at capture time, or `fallback` (the caller's
    /// current repo root) when the field was absent from an older entry.
    pub fn repo_dir_or<'a>(&'a self, fallback: &'a Path) -> &'a Path {
        if self.repo_dir.as_os_str().is_empty() {
            fallback
        } else {
            &self.repo_dir
        }
    }
}

/// Everything the engine captured from a miss, ready to be stored.
pub struct CapturedRun {
    pub dependencies: Vec<FileMetadata>,
    /// Absolute artifact paths as produced by the tool.
    pub artifacts: Vec<PathBuf>,
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

/// Holds (a) a map of already-opened `FolderIndex` handles and (b) a
/// thread pool handle, both released on drop. No process-wide singletons
/// — callers construct one `CacheStore` per cache root.
pub struct CacheStore {
    cache_root: PathBuf,
    indexes: Mutex<HashMap<String, Arc<Mutex<FolderIndex>>>>,
    pool: ThreadPool,
}

impl CacheStore {
    pub fn open(cache_root: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_workers(cache_root, DEFAULT_RESTORE_WORKERS)
    }

    pub fn open_with_workers(cache_root: impl Into<PathBuf>, workers: usize) -> Result<Self> {
        let cache_root = cache_root.into();
        std::fs::create_dir_all(&cache_root)
            .map_err(|e| CacheError::io(format!("create cache root {cache_root:?}"), e))?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cachegrind-restore-{i}"))
            .build()
            .expect("valid thread pool configuration");
        Ok(Self {
            cache_root,
            indexes: Mutex::new(HashMap::new()),
            pool,
        })
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn entry_dir(&self, key: &CacheKey, cache_key: &str) -> PathBuf {
        self.folder_dir(key).join(cache_key)
    }

    fn folder_dir(&self, key: &CacheKey) -> PathBuf {
        self.cache_root.join(key.folder_name())
    }

    /// Get (opening and caching if needed) the `FolderIndex` handle for a
    /// key's folder.
    fn folder_handle(&self, key: &CacheKey) -> Result<Arc<Mutex<FolderIndex>>> {
        let folder_name = key.folder_name();
        let mut indexes = self.indexes.lock().expect("indexes mutex poisoned");
        if let Some(handle) = indexes.get(&folder_name) {
            return Ok(handle.clone());
        }
        let dir = self.folder_dir(key);
        let idx = FolderIndex::open(dir, &key.compound_key_string())?;
        let handle = Arc::new(Mutex::new(idx));
        indexes.insert(folder_name, handle.clone());
        Ok(handle)
    }

    pub fn lookup(&self, key: &CacheKey, repo_root: &Path) -> Result<Option<LookupHit>> {
        lookup::lookup(self, key, repo_root)
    }

    pub fn store(&self, key: &CacheKey, repo_root: &Path, captured: CapturedRun) -> Result<String> {
        save::store(self, key, repo_root, captured)
    }

    pub fn restore(
        &self,
        key: &CacheKey,
        cache_key: &str,
        repo_root: &Path,
    ) -> Result<RestoreOutcome> {
        restore::restore(self, key, cache_key, repo_root)
    }

    pub(crate) fn pool(&self) -> &ThreadPool {
        &self.pool
    }
}
