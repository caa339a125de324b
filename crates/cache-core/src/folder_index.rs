//! Per-CacheKey on-disk folder index: `folder_index.json`, entry id
//! allocation, and the in-memory dep-hash dedup map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use blake2::Blake2b;
use blake2::digest::{Digest, consts::U8};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::file_metadata::FileMetadata;
use crate::fs::atomic_write;

pub const INDEX_FILE_NAME: &str = "folder_index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub cache_key: String,
    pub dependencies: Vec<FileMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OnDisk {
    compound_key: String,
    next_entry_id: u64,
    entries: Vec<IndexEntry>,
}

/// An open handle to one CacheKey's folder. Holds the deserialized index
/// plus an auxiliary `dep_hash -> cache_key` map rebuilt from it.
pub struct FolderIndex {
    dir: PathBuf,
    compound_key: String,
    next_entry_id: u64,
    entries: Vec<IndexEntry>,
    dep_hash_index: HashMap<String, String>,
}

impl FolderIndex {
    /// Load `folder_index.json` from `dir`, or initialize an empty index
    /// for `compound_key` if the folder has not been touched before.
    pub fn open(dir: PathBuf, compound_key: &str) -> Result<Self> {
        let index_path = dir.join(INDEX_FILE_NAME);
        let on_disk = match std::fs::read(&index_path) {
            Ok(bytes) => match serde_json::from_slice::<OnDisk>(&bytes) {
                Ok(v) => v,
                Err(e) => {
                    // Malformed JSON here means a writer was interrupted
                    // mid-rewrite or two writers raced despite the
                    // temp+rename contract. Discard the corrupt side and
                    // start fresh rather than propagate — correctness
                    // degrades only to a miss, never to a wrong answer.
                    let conflict = CacheError::IndexConflict {
                        path: index_path.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(error = %conflict, "folder_index.json corrupt, starting fresh");
                    OnDisk {
                        compound_key: compound_key.to_string(),
                        next_entry_id: 1,
                        entries: Vec::new(),
                    }
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => OnDisk {
                compound_key: compound_key.to_string(),
                next_entry_id: 1,
                entries: Vec::new(),
            },
            Err(e) => return Err(CacheError::io(format!("read {index_path:?}"), e)),
        };

        let dep_hash_index = build_dep_hash_index(&on_disk.entries);

        Ok(Self {
            dir,
            compound_key: on_disk.compound_key,
            next_entry_id: on_disk.next_entry_id,
            entries: on_disk.entries,
            dep_hash_index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Look up an existing `cache_key` by dependency-set dep-hash, for
    /// store-time dedup.
    pub fn find_by_dep_hash(&self, dep_hash: &str) -> Option<&str> {
        self.dep_hash_index.get(dep_hash).map(String::as_str)
    }

    /// Allocate the next monotonic, zero-padded entry id (e.g.
    /// `entry_000001`). Does not persist by itself; call [`Self::persist`]
    /// afterward.
    pub fn allocate_entry_id(&mut self) -> String {
        let id = self.next_entry_id;
        self.next_entry_id += 1;
        format!("entry_{id:06}")
    }

    /// Append a brand-new entry (after allocating its id and copying its
    /// artifacts). Updates the dedup map in memory.
    pub fn push_entry(&mut self, cache_key: String, dependencies: Vec<FileMetadata>) {
        let dep_hash = dependency_hash(&dependencies);
        self.dep_hash_index.insert(dep_hash, cache_key.clone());
        self.entries.push(IndexEntry {
            cache_key,
            dependencies,
        });
    }

    /// Replace the dependency list of an existing entry in place. Used by
    /// a Phase-2 lookup hit refreshing mtimes — the entry keeps its
    /// position, nothing is appended.
    pub fn refresh_entry_dependencies(&mut self, cache_key: &str, dependencies: Vec<FileMetadata>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.cache_key == cache_key) {
            entry.dependencies = dependencies;
        }
    }

    /// Append a new index pointer at an *existing* `cache_key` (no new id,
    /// no new entry directory) — the store-time dedup path. The dep-hash
    /// map already resolves to `cache_key`; this just records a fresh
    /// pointer row with the refreshed dependency mtimes, appending a
    /// collision-list entry even when reusing an existing directory.
    pub fn append_dedup_pointer(&mut self, cache_key: String, dependencies: Vec<FileMetadata>) {
        let dep_hash = dependency_hash(&dependencies);
        self.dep_hash_index.insert(dep_hash, cache_key.clone());
        self.entries.push(IndexEntry {
            cache_key,
            dependencies,
        });
    }

    /// Drop entries whose `cache_key` is in `removed` (used by cleanup).
    pub fn remove_entries(&mut self, removed: &std::collections::HashSet<String>) {
        self.entries.retain(|e| !removed.contains(&e.cache_key));
        self.dep_hash_index.retain(|_, v| !removed.contains(v));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write `folder_index.json` atomically (temp file in the same
    /// folder, then rename) so readers always see either the old or new
    /// file, never a partial write.
    pub fn persist(&self) -> Result<()> {
        let on_disk = OnDisk {
            compound_key: self.compound_key.clone(),
            next_entry_id: self.next_entry_id,
            entries: self.entries.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&on_disk)
            .map_err(|e| CacheError::serde("encode folder_index.json", e))?;
        atomic_write(&self.dir, INDEX_FILE_NAME, &bytes)
    }
}

fn build_dep_hash_index(entries: &[IndexEntry]) -> HashMap<String, String> {
    let mut map = HashMap::with_capacity(entries.len());
    for entry in entries {
        if entry.dependencies.is_empty() {
            continue;
        }
        map.insert(dependency_hash(&entry.dependencies), entry.cache_key.clone());
    }
    map
}

/// 64-bit BLAKE2b over the ordered concatenation of `"<path>:<hash>"` for
/// each dependency, in the order provided (order matters: it must be
/// deterministic per-input so equal dependency sets hash equal).
pub fn dependency_hash(dependencies: &[FileMetadata]) -> String {
    let mut hasher = Blake2b::<U8>::new();
    for dep in dependencies {
        hasher.update(dep.path.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(dep.hash.as_str().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_hash::ContentHash;
    use crate::repo_path::RepoPath;
    use tempfile::TempDir;

    fn dep(path: &str, hash: &str) -> FileMetadata {
        FileMetadata {
            path: RepoPath::from_relative_str(path),
            hash: ContentHash::of_raw(hash.as_bytes()),
            mtime_ns: 0,
            size: 0,
        }
    }

    #[test]
    fn missing_index_starts_empty() {
        let dir = TempDir::new().unwrap();
        let idx = FolderIndex::open(dir.path().to_path_buf(), "k").unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn allocate_entry_id_is_monotonic_and_zero_padded() {
        let dir = TempDir::new().unwrap();
        let mut idx = FolderIndex::open(dir.path().to_path_buf(), "k").unwrap();
        assert_eq!(idx.allocate_entry_id(), "entry_000001");
        assert_eq!(idx.allocate_entry_id(), "entry_000002");
    }

    #[test]
    fn persist_then_reopen_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut idx = FolderIndex::open(dir.path().to_path_buf(), "k").unwrap();
        let id = idx.allocate_entry_id();
        idx.push_entry(id.clone(), vec![dep("a.cpp", "aaaa")]);
        idx.persist().unwrap();

        let reopened = FolderIndex::open(dir.path().to_path_buf(), "k").unwrap();
        assert_eq!(reopened.entries().len(), 1);
        assert_eq!(reopened.entries()[0].cache_key, id);
        let dh = dependency_hash(&[dep("a.cpp", "aaaa")]);
        assert_eq!(reopened.find_by_dep_hash(&dh), Some(id.as_str()));
    }

    #[test]
    fn dep_hash_dedup_detects_identical_sets() {
        let deps_a = vec![dep("a.cpp", "h1"), dep("b.h", "h2")];
        let deps_b = vec![dep("a.cpp", "h1"), dep("b.h", "h2")];
        assert_eq!(dependency_hash(&deps_a), dependency_hash(&deps_b));
    }

    #[test]
    fn append_dedup_pointer_grows_entries_without_new_id() {
        let dir = TempDir::new().unwrap();
        let mut idx = FolderIndex::open(dir.path().to_path_buf(), "k").unwrap();
        let id = idx.allocate_entry_id();
        idx.push_entry(id.clone(), vec![dep("a.cpp", "aaaa")]);
        assert_eq!(idx.entries().len(), 1);

        idx.append_dedup_pointer(id.clone(), vec![dep("a.cpp", "aaaa")]);
        assert_eq!(idx.entries().len(), 2);
        assert!(idx.entries().iter().all(|e| e.cache_key == id));

        // No new id was allocated by the dedup pointer.
        assert_eq!(idx.allocate_entry_id(), "entry_000002");
    }
}
