//! The small interface the engine requires from a per-tool wrapper.
//!
//! No concrete adapter ships in this crate — per-tool argument parsing and
//! dependency discovery (preprocessor-include emission, MSVC environment
//! loading, etc.) are external collaborators out of scope here. Only the
//! trait and the output-file detection protocol live in this crate; tests
//! exercise the orchestrator against a stub implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::repo_path::RepoPath;

/// An absolute glob pattern, e.g. `/repo/build/*.o`. `**` is a
/// multi-segment wildcard.
pub type AbsoluteGlob = String;

/// Per-tool behavior the engine needs to run a tool and know what it
/// touched.
pub trait ToolAdapter {
    /// Additional environment variables for the child process, if any.
    fn env(&self) -> Option<HashMap<String, String>> {
        None
    }

    /// Every file whose content contributed to the tool's output and that
    /// lives inside `repo_root`. Paths outside the repo are silently
    /// dropped by the caller of this method — adapters may return them,
    /// but the engine will not track them (they are assumed stable).
    fn discover_dependencies(&self, main_file: &Path, repo_root: &Path) -> Result<Vec<RepoPath>>;

    /// Absolute glob patterns likely to match artifacts this invocation
    /// will create or overwrite.
    fn output_patterns(&self, main_file: &Path, repo_root: &Path) -> Vec<AbsoluteGlob>;

    /// The full argv vector to execute (argv[0] is the tool binary).
    fn build_command(&self, main_file: &Path) -> Vec<String>;

    /// Whether a run with this exit code should still be cached. Compilers
    /// want failing (diagnostic) runs cached; whole-repo tools may not.
    /// Default: cache every exit code.
    fn should_cache(&self, _returncode: i32) -> bool {
        true
    }
}

/// A `(path, mtime_ns)` snapshot of every file matching an adapter's
/// output patterns, taken before and after a tool execution.
pub struct OutputSnapshot {
    pub mtimes: HashMap<PathBuf, i64>,
}

impl OutputSnapshot {
    pub fn take(patterns: &[AbsoluteGlob]) -> Self {
        let mut mtimes = HashMap::new();
        for pattern in patterns {
            for path in glob_matches(pattern) {
                if let Ok(meta) = std::fs::metadata(&path) {
                    if let Some(ns) = mtime_ns(&meta) {
                        mtimes.insert(path, ns);
                    }
                }
            }
        }
        Self { mtimes }
    }

    /// Diff `self` (before) against `after`: the produced set is every
    /// path present only in `after`, unioned with every path whose mtime
    /// strictly increased. Tolerates tools that overwrite pre-existing
    /// outputs in place.
    pub fn diff_produced(&self, after: &OutputSnapshot) -> Vec<PathBuf> {
        after
            .mtimes
            .iter()
            .filter(|(path, new_mtime)| match self.mtimes.get(*path) {
                None => true,
                Some(old_mtime) => new_mtime > old_mtime,
            })
            .map(|(path, _)| path.clone())
            .collect()
    }
}

fn mtime_ns(meta: &std::fs::Metadata) -> Option<i64> {
    let t = meta.modified().ok()?;
    let d = t.duration_since(std::time::UNIX_EPOCH).ok()?;
    Some(d.as_nanos() as i64)
}

/// Expand a single absolute glob pattern (supporting `**` as a
/// multi-segment wildcard) to matching paths on disk.
fn glob_matches(pattern: &str) -> Vec<PathBuf> {
    walkdir_glob::expand(pattern)
}

/// Tiny glob expander built on `walkdir`, scoped to exactly what
/// `output_patterns` needs (absolute, `**`-aware, no brace expansion).
mod walkdir_glob {
    use std::path::{Path, PathBuf};

    pub fn expand(pattern: &str) -> Vec<PathBuf> {
        let pattern_path = Path::new(pattern);
        let mut root = PathBuf::new();
        let mut rest_segments: Vec<&str> = Vec::new();
        let mut hit_wildcard = false;

        for comp in pattern_path.components() {
            let seg = comp.as_os_str().to_string_lossy();
            if !hit_wildcard && !seg.contains('*') && !seg.contains('?') {
                root.push(comp.as_os_str());
            } else {
                hit_wildcard = true;
                rest_segments.push(comp.as_os_str().to_str().unwrap_or(""));
            }
        }

        if !root.exists() {
            return Vec::new();
        }
        if rest_segments.is_empty() {
            return vec![root];
        }

        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                if match_segments(&rest_segments, rel) {
                    out.push(entry.path().to_path_buf());
                }
            }
        }
        out
    }

    fn match_segments(pattern: &[&str], rel: &Path) -> bool {
        let rel_str = rel.to_string_lossy();
        let rel_segs: Vec<&str> = rel_str.split(std::path::MAIN_SEPARATOR).collect();
        match_rec(pattern, &rel_segs)
    }

    fn match_rec(pattern: &[&str], rel: &[&str]) -> bool {
        match pattern.first() {
            None => rel.is_empty(),
            Some(&"**") => {
                if pattern.len() == 1 {
                    return true;
                }
                (0..=rel.len()).any(|i| match_rec(&pattern[1..], &rel[i..]))
            }
            Some(seg) => {
                if rel.is_empty() {
                    return false;
                }
                glob_segment_matches(seg, rel[0]) && match_rec(&pattern[1..], &rel[1..])
            }
        }
    }

    fn glob_segment_matches(pattern: &str, value: &str) -> bool {
        // Minimal `*`/`?` matcher, sufficient for single-segment globs.
        fn rec(p: &[u8], v: &[u8]) -> bool {
            match p.first() {
                None => v.is_empty(),
                Some(b'*') => (0..=v.len()).any(|i| rec(&p[1..], &v[i..])),
                Some(b'?') => !v.is_empty() && rec(&p[1..], &v[1..]),
                Some(&c) => !v.is_empty() && v[0] == c && rec(&p[1..], &v[1..]),
            }
        }
        rec(pattern.as_bytes(), value.as_bytes())
    }
}
