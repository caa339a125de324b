//! Repository-relative, normalized, POSIX-serialized file paths.
//!
//! Deliberately a single dedicated newtype rather than a generic
//! `TypedPath<Base, Type>` typestate machinery — this crate needs exactly
//! one validated path shape, not a system over bases and dir/file markers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// A file location expressed relative to a repository root, in POSIX form.
///
/// Invariant: the stored form is relative, lexically normalized, and never
/// contains a `..` segment. Never resolves symlinks or touches the
/// filesystem — realpath resolution would pin cache keys to symlink
/// targets and break portability across hosts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoPath {
    /// Normalized, forward-slash-joined segments, stored without a leading
    /// or trailing slash.
    rel: String,
}

impl RepoPath {
    /// Validate and construct a `RepoPath` from a candidate path.
    ///
    /// If `candidate` is relative, it is joined against `cwd` (defaulting
    /// to `repo_root` when `cwd` is `None`) before normalization.
    pub fn new(repo_root: &Path, candidate: &Path, cwd: Option<&Path>) -> Result<Self> {
        let base = cwd.unwrap_or(repo_root);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base.join(candidate)
        };

        let normalized_repo_root = normalize_lexically(repo_root);
        let normalized = normalize_lexically(&joined);

        let rel = normalized
            .strip_prefix(&normalized_repo_root)
            .map_err(|_| CacheError::PathOutsideRepo {
                path: joined.clone(),
                root: repo_root.to_path_buf(),
            })?;

        let rel_posix = path_to_posix(rel);
        if rel_posix.is_empty() || rel_posix.starts_with("..") {
            return Err(CacheError::PathOutsideRepo {
                path: joined,
                root: repo_root.to_path_buf(),
            });
        }

        Ok(Self { rel: rel_posix })
    }

    /// Construct from a path string already known to be a valid,
    /// normalized, repo-relative POSIX path (e.g. one decoded from
    /// `metadata.json`). Skips validation — the caller attests the
    /// invariant already holds.
    pub fn from_relative_str(s: &str) -> Self {
        Self {
            rel: s.trim_matches('/').to_string(),
        }
    }

    /// Join this path back onto a repo root to get an absolute path.
    pub fn to_absolute(&self, repo_root: &Path) -> PathBuf {
        let mut out = repo_root.to_path_buf();
        for seg in self.rel.split('/') {
            out.push(seg);
        }
        out
    }

    /// POSIX-style string form, e.g. `"a/b/c.h"`.
    pub fn as_str(&self) -> &str {
        &self.rel
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.rel)
    }
}

/// Remove `.` segments and resolve `..` segments lexically, without
/// touching the filesystem (no symlink resolution, no existence check).
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<std::ffi::OsString> = Vec::new();
    for comp in path.components() {
        use std::path::Component::*;
        match comp {
            Prefix(p) => out.push(p.as_os_str().to_os_string()),
            RootDir => out.push(std::path::MAIN_SEPARATOR.to_string().into()),
            CurDir => {}
            ParentDir => {
                out.pop();
            }
            Normal(seg) => out.push(seg.to_os_string()),
        }
    }
    out.into_iter().collect()
}

fn path_to_posix(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
