//! Two-phase dependency validation: mtime/size fast path, then
//! content-hash slow path.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cache_key::CacheKey;
use crate::error::Result;
use crate::file_metadata::FileMetadata;
use crate::fs::atomic_write;

use super::{CacheStore, EntryMetadata, METADATA_FILE_NAME};

/// Result of a successful lookup: the entry directory and its id.
pub struct LookupHit {
    pub entry_dir: PathBuf,
    pub cache_key: String,
}

pub fn lookup(store: &CacheStore, key: &CacheKey, repo_root: &Path) -> Result<Option<LookupHit>> {
    let folder_dir = store.folder_dir(key);
    if !folder_dir.exists() {
        debug!(folder = ?folder_dir, "lookup: no folder for key");
        return Ok(None);
    }

    let handle = store.folder_handle(key)?;
    let mut index = handle.lock().expect("folder index mutex poisoned");

    // Phase 1: mtime+size only, no file reads.
    for entry in index.entries() {
        if entry
            .dependencies
            .iter()
            .all(|d| d.matches_mtime_only(repo_root))
        {
            let entry_dir = folder_dir.join(&entry.cache_key);
            if entry_dir.exists() {
                debug!(cache_key = %entry.cache_key, "lookup: phase 1 hit");
                return Ok(Some(LookupHit {
                    entry_dir,
                    cache_key: entry.cache_key.clone(),
                }));
            }
        }
    }

    // Phase 2: hash only dependencies whose mtime changed.
    let entry_cache_keys: Vec<String> = index.entries().iter().map(|e| e.cache_key.clone()).collect();
    for cache_key in entry_cache_keys {
        let deps: Vec<FileMetadata> = index
            .entries()
            .iter()
            .find(|e| e.cache_key == cache_key)
            .map(|e| e.dependencies.clone())
            .unwrap_or_default();

        let mut refreshed = Vec::with_capacity(deps.len());
        let mut all_match = true;
        for dep in &deps {
            let (matches, updated) = dep.matches_current(repo_root);
            if !matches {
                all_match = false;
                break;
            }
            refreshed.push(updated.expect("matches_current returns Some metadata on match"));
        }

        if !all_match {
            continue;
        }

        let entry_dir = folder_dir.join(&cache_key);
        if !entry_dir.exists() {
            continue;
        }

        debug!(cache_key = %cache_key, "lookup: phase 2 hit, refreshing mtimes");
        index.refresh_entry_dependencies(&cache_key, refreshed.clone());
        index.persist()?;
        refresh_entry_metadata_file(&entry_dir, &refreshed)?;

        return Ok(Some(LookupHit { entry_dir, cache_key }));
    }

    Ok(None)
}

fn refresh_entry_metadata_file(entry_dir: &Path, dependencies: &[FileMetadata]) -> Result<()> {
    let metadata_path = entry_dir.join(METADATA_FILE_NAME);
    let bytes = std::fs::read(&metadata_path)
        .map_err(|e| crate::error::CacheError::io(format!("read {metadata_path:?}"), e))?;
    let mut metadata: EntryMetadata = serde_json::from_slice(&bytes)
        .map_err(|e| crate::error::CacheError::serde(format!("decode {metadata_path:?}"), e))?;
    metadata.dependencies = dependencies.to_vec();
    let bytes = serde_json::to_vec_pretty(&metadata)
        .map_err(|e| crate::error::CacheError::serde("encode metadata.json", e))?;
    atomic_write(entry_dir, METADATA_FILE_NAME, &bytes)
}
