//! `(RepoPath, ContentHash, mtime_ns, size)` tuples and the mtime-first
//! validation fast path used by both lookup and store.

use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::content_hash::{ContentHash, hash_cpp_source};
use crate::error::Result;
use crate::repo_path::RepoPath;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: RepoPath,
    pub hash: ContentHash,
    pub mtime_ns: i64,
    pub size: u64,
}

impl FileMetadata {
    /// Stat and hash the file at `repo_path` as it exists right now.
    pub fn from_disk(repo_path: RepoPath, repo_root: &Path) -> Result<Self> {
        let abs = repo_path.to_absolute(repo_root);
        let stat = std::fs::metadata(&abs)
            .map_err(|e| crate::error::CacheError::io(format!("stat {abs:?}"), e))?;
        let hash = hash_cpp_source(&repo_path, repo_root)?;
        Ok(Self {
            path: repo_path,
            hash,
            mtime_ns: mtime_ns(&stat),
            size: stat.len(),
        })
    }

    /// Phase-1 check: `(mtime_ns, size)` equality only, no file reads.
    /// Used by [`crate::store`]'s lookup fast path.
    pub fn matches_mtime_only(&self, repo_root: &Path) -> bool {
        let abs = self.path.to_absolute(repo_root);
        match std::fs::metadata(&abs) {
            Ok(stat) if stat.is_file() => {
                mtime_ns(&stat) == self.mtime_ns && stat.len() == self.size
            }
            _ => false,
        }
    }

    /// Check whether this metadata still matches the file on disk.
    ///
    /// Stats first; an unchanged `(mtime_ns, size)` pair is a hit without
    /// reading the file. A changed size is an immediate miss. Otherwise
    /// the file is re-hashed; on a hash match the returned metadata has a
    /// refreshed `mtime_ns` (same hash, same size).
    pub fn matches_current(&self, repo_root: &Path) -> (bool, Option<FileMetadata>) {
        let abs = self.path.to_absolute(repo_root);
        let stat = match std::fs::metadata(&abs) {
            Ok(s) if s.is_file() => s,
            _ => return (false, None),
        };

        let current_mtime = mtime_ns(&stat);
        let current_size = stat.len();

        if current_mtime == self.mtime_ns && current_size == self.size {
            return (true, Some(self.clone()));
        }

        if current_size != self.size {
            return (false, None);
        }

        match hash_cpp_source(&self.path, repo_root) {
            Ok(current_hash) if current_hash == self.hash => (
                true,
                Some(FileMetadata {
                    path: self.path.clone(),
                    hash: self.hash.clone(),
                    mtime_ns: current_mtime,
                    size: current_size,
                }),
            ),
            _ => (false, None),
        }
    }
}

fn mtime_ns(stat: &std::fs::Metadata) -> i64 {
    match stat.modified() {
        Ok(t) => match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_nanos() as i64,
            Err(e) => -(e.duration().as_nanos() as i64),
        },
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> RepoPath {
        fs::write(dir.path().join(name), content).unwrap();
        RepoPath::new(dir.path(), Path::new(name), None).unwrap()
    }

    #[test]
    fn fresh_metadata_matches_itself() {
        let dir = TempDir::new().unwrap();
        let rp = write(&dir, "a.cpp", "int main(){return 0;}");
        let meta = FileMetadata::from_disk(rp, dir.path()).unwrap();
        let (matches, refreshed) = meta.matches_current(dir.path());
        assert!(matches);
        assert_eq!(refreshed.unwrap(), meta);
    }

    #[test]
    fn missing_file_is_no_match() {
        let dir = TempDir::new().unwrap();
        let rp = RepoPath::new(dir.path(), Path::new("missing.cpp"), None).unwrap();
        let meta = FileMetadata {
            path: rp,
            hash: ContentHash::of_raw(b"x"),
            mtime_ns: 0,
            size: 0,
        };
        let (matches, refreshed) = meta.matches_current(dir.path());
        assert!(!matches);
        assert!(refreshed.is_none());
    }

    #[test]
    fn size_change_is_fast_rejected_without_hash() {
        let dir = TempDir::new().unwrap();
        let rp = write(&dir, "a.cpp", "short");
        let mut meta = FileMetadata::from_disk(rp.clone(), dir.path()).unwrap();
        meta.size += 1; // pretend a cached size that no longer matches
        let (matches, _) = meta.matches_current(dir.path());
        assert!(!matches);
    }
}
