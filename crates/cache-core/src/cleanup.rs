//! Cache-entry iteration, grouping, filtering, and deletion — the API
//! surface the cleanup CLI drives. Argument parsing is ambient CLI wiring
//! (see `cache-cli`); this module owns only the on-disk contract:
//! `iter_entries`/`get_stats`/`find_entries`/`delete_entries`, including
//! per-folder deletion grouping and an empty-folder sweep.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::error::Result;
use crate::folder_index::{FolderIndex, INDEX_FILE_NAME};
use crate::store::{EntryMetadata, METADATA_FILE_NAME};

/// One on-disk `entry_NNNNNN/` directory, with derived stats.
#[derive(Debug, Clone)]
pub struct CleanupCacheEntry {
    pub entry_dir: PathBuf,
    pub metadata: EntryMetadata,
    pub age_days: f64,
    pub size_bytes: u64,
}

/// Per-repository aggregate, keyed by the entry's stored `repo_dir`.
#[derive(Debug, Default)]
pub struct RepoStats {
    pub repo_dir: String,
    pub entries: Vec<CleanupCacheEntry>,
}

impl RepoStats {
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }

    pub fn oldest_days(&self) -> f64 {
        self.entries.iter().map(|e| e.age_days).fold(0.0, f64::max)
    }

    pub fn newest_days(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries
            .iter()
            .map(|e| e.age_days)
            .fold(f64::INFINITY, f64::min)
    }
}

/// Filters combined with AND logic, matching the cleanup command's
/// `--repo`/`--older-than`/`--tool` flags.
#[derive(Debug, Default, Clone)]
pub struct EntryFilter {
    pub repo: Option<PathBuf>,
    pub older_than_days: Option<f64>,
    pub tool: Option<String>,
}

pub struct CacheCleanup {
    cache_root: PathBuf,
}

impl CacheCleanup {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Iterate every entry under the cache root. Entries whose
    /// `metadata.json` is missing or malformed are skipped with a logged
    /// warning rather than aborting the whole scan.
    pub fn iter_entries(&self) -> Vec<CleanupCacheEntry> {
        let mut out = Vec::new();
        let Ok(folders) = std::fs::read_dir(&self.cache_root) else {
            return out;
        };

        let now = SystemTime::now();
        for folder in folders.filter_map(|e| e.ok()) {
            let folder_path = folder.path();
            if !folder_path.is_dir() {
                continue;
            }

            let Ok(children) = std::fs::read_dir(&folder_path) else {
                continue;
            };
            for child in children.filter_map(|e| e.ok()) {
                let entry_dir = child.path();
                if !entry_dir.is_dir() {
                    continue;
                }
                let Some(name) = entry_dir.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !name.starts_with("entry_") {
                    continue;
                }

                let metadata_path = entry_dir.join(METADATA_FILE_NAME);
                let metadata_stat = match std::fs::metadata(&metadata_path) {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                let bytes = match std::fs::read(&metadata_path) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(path = ?metadata_path, error = %e, "cleanup: skipping unreadable entry");
                        continue;
                    }
                };
                let metadata: EntryMetadata = match serde_json::from_slice(&bytes) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(path = ?metadata_path, error = %e, "cleanup: skipping corrupt entry");
                        continue;
                    }
                };

                let age_days = metadata_stat
                    .modified()
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .map(|d| d.as_secs_f64() / 86_400.0)
                    .unwrap_or(0.0);

                let size_bytes = dir_size(&entry_dir);

                out.push(CleanupCacheEntry {
                    entry_dir,
                    metadata,
                    age_days,
                    size_bytes,
                });
            }
        }
        out
    }

    /// Group all entries by stored `repo_dir`, for a stats report.
    pub fn get_stats(&self) -> HashMap<String, RepoStats> {
        let mut stats: HashMap<String, RepoStats> = HashMap::new();
        for entry in self.iter_entries() {
            let repo_dir = entry.metadata.repo_dir.to_string_lossy().into_owned();
            let bucket = stats.entry(repo_dir.clone()).or_insert_with(|| RepoStats {
                repo_dir: repo_dir.clone(),
                entries: Vec::new(),
            });
            bucket.entries.push(entry);
        }
        stats
    }

    /// Find entries matching every filter set in `filter` (AND logic).
    pub fn find_entries(&self, filter: &EntryFilter) -> Vec<CleanupCacheEntry> {
        let normalized_repo = filter
            .repo
            .as_ref()
            .map(|p| normalize_repo_for_compare(p));

        self.iter_entries()
            .into_iter()
            .filter(|entry| {
                if let Some(ref repo) = normalized_repo {
                    let entry_repo = entry.metadata.repo_dir.to_string_lossy().to_lowercase();
                    if &entry_repo != repo {
                        return false;
                    }
                }
                if let Some(older_than) = filter.older_than_days {
                    if entry.age_days < older_than {
                        return false;
                    }
                }
                if let Some(ref tool) = filter.tool {
                    if &entry.metadata.tool_name != tool {
                        return false;
                    }
                }
                true
            })
            .collect()
    }

    /// Delete `entries`. In dry-run mode, only totals sizes without
    /// touching disk. On a real deletion, folder indexes are rewritten
    /// once per affected folder (not once per entry), and any CacheKey
    /// folder left holding only `folder_index.json` (or nothing) is
    /// removed.
    ///
    /// Returns `(deleted, failed, deleted_bytes)`.
    pub fn delete_entries(
        &self,
        entries: &[CleanupCacheEntry],
        dry_run: bool,
    ) -> (usize, usize, u64) {
        let mut deleted = 0usize;
        let mut failed = 0usize;
        let mut deleted_bytes = 0u64;
        let mut deleted_by_folder: HashMap<PathBuf, HashSet<String>> = HashMap::new();

        for entry in entries {
            if dry_run {
                deleted += 1;
                deleted_bytes += entry.size_bytes;
                continue;
            }

            match std::fs::remove_dir_all(&entry.entry_dir) {
                Ok(()) => {
                    deleted += 1;
                    deleted_bytes += entry.size_bytes;
                    if let Some(folder) = entry.entry_dir.parent() {
                        if let Some(cache_key) =
                            entry.entry_dir.file_name().and_then(|n| n.to_str())
                        {
                            deleted_by_folder
                                .entry(folder.to_path_buf())
                                .or_default()
                                .insert(cache_key.to_string());
                        }
                    }
                }
                Err(_) => failed += 1,
            }
        }

        if !dry_run {
            for (folder, removed_keys) in &deleted_by_folder {
                if let Err(e) = self.update_folder_index(folder, removed_keys) {
                    warn!(folder = ?folder, error = %e, "cleanup: failed to update folder_index.json after deletion");
                }
            }
            self.remove_empty_folders();
        }

        (deleted, failed, deleted_bytes)
    }

    fn update_folder_index(&self, folder: &Path, removed_keys: &HashSet<String>) -> Result<()> {
        if !folder.join(INDEX_FILE_NAME).exists() {
            return Ok(());
        }
        let mut index = FolderIndex::open(folder.to_path_buf(), "")?;
        index.remove_entries(removed_keys);
        index.persist()
    }

    fn remove_empty_folders(&self) {
        let Ok(folders) = std::fs::read_dir(&self.cache_root) else {
            return;
        };
        for folder in folders.filter_map(|e| e.ok()) {
            let path = folder.path();
            if !path.is_dir() {
                continue;
            }
            let Ok(mut children) = std::fs::read_dir(&path) else {
                continue;
            };
            let has_remaining = children.any(|c| {
                c.ok()
                    .map(|c| c.file_name() != std::ffi::OsStr::new(INDEX_FILE_NAME))
                    .unwrap_or(true)
            });
            if !has_remaining {
                let _ = std::fs::remove_dir_all(&path);
            }
        }
    }
}

fn normalize_repo_for_compare(repo: &Path) -> String {
    std::fs::canonicalize(repo)
        .unwrap_or_else(|_| repo.to_path_buf())
        .to_string_lossy()
        .to_lowercase()
}

fn dir_size(dir: &Path) -> u64 {
    let mut total = 0u64;
    if let Ok(entries) = walkdir::WalkDir::new(dir)
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
    {
        for entry in entries {
            if entry.file_type().is_file() {
                if let Ok(meta) = entry.metadata() {
                    total += meta.len();
                }
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo_path::RepoPath;
    use tempfile::TempDir;

    fn write_entry(
        cache_root: &Path,
        folder: &str,
        entry: &str,
        repo_dir: &str,
        tool_name: &str,
    ) {
        let dir = cache_root.join(folder).join(entry);
        std::fs::create_dir_all(&dir).unwrap();
        let metadata = EntryMetadata {
            cache_key: entry.to_string(),
            source_file: RepoPath::from_relative_str("a.cpp"),
            tool_name: tool_name.to_string(),
            tool_args: vec![],
            main_file_path: RepoPath::from_relative_str("a.cpp"),
            dependencies: vec![],
            files: vec![],
            stdout: String::new(),
            stderr: String::new(),
            returncode: 0,
            repo_dir: PathBuf::from(repo_dir),
        };
        std::fs::write(
            dir.join(METADATA_FILE_NAME),
            serde_json::to_vec_pretty(&metadata).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn iter_entries_skips_missing_metadata() {
        let cache = TempDir::new().unwrap();
        std::fs::create_dir_all(cache.path().join("k1/entry_000001")).unwrap();
        let cleanup = CacheCleanup::new(cache.path());
        assert!(cleanup.iter_entries().is_empty());
    }

    #[test]
    fn find_entries_filters_by_tool_and_repo() {
        let cache = TempDir::new().unwrap();
        write_entry(cache.path(), "k1", "entry_000001", "/repo/a", "cl");
        write_entry(cache.path(), "k2", "entry_000001", "/repo/b", "clang");
        let cleanup = CacheCleanup::new(cache.path());

        let filtered = cleanup.find_entries(&EntryFilter {
            tool: Some("cl".to_string()),
            ..Default::default()
        });
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].metadata.tool_name, "cl");
    }

    #[test]
    fn delete_entries_dry_run_does_not_touch_disk() {
        let cache = TempDir::new().unwrap();
        write_entry(cache.path(), "k1", "entry_000001", "/repo/a", "cl");
        let cleanup = CacheCleanup::new(cache.path());
        let entries = cleanup.iter_entries();
        let (deleted, failed, _) = cleanup.delete_entries(&entries, true);
        assert_eq!(deleted, 1);
        assert_eq!(failed, 0);
        assert!(cache.path().join("k1/entry_000001").exists());
    }

    #[test]
    fn delete_entries_removes_empty_folder() {
        let cache = TempDir::new().unwrap();
        write_entry(cache.path(), "k1", "entry_000001", "/repo/a", "cl");
        std::fs::write(
            cache.path().join("k1").join(INDEX_FILE_NAME),
            br#"{"compound_key":"k","next_entry_id":2,"entries":[{"cache_key":"entry_000001","dependencies":[]}]}"#,
        )
        .unwrap();

        let cleanup = CacheCleanup::new(cache.path());
        let entries = cleanup.iter_entries();
        let (deleted, failed, _) = cleanup.delete_entries(&entries, false);
        assert_eq!(deleted, 1);
        assert_eq!(failed, 0);
        assert!(!cache.path().join("k1").exists());
    }
}
