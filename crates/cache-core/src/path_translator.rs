//! Rewrite absolute paths embedded in captured stdout/stderr when a cache
//! entry captured at one repo location is replayed at another.
//!
//! Deliberately a heuristic: only paths the engine itself knows it wrote
//! (source, dependencies, artifacts) are rewritten. Free text mentioning
//! unrelated system paths is left untouched — we translate what we know we
//! emitted, never guess.

use std::path::Path;

use crate::repo_path::RepoPath;

/// Rewrite every occurrence of `old_root/rel` with `new_root/rel`, for
/// each `rel` in `tracked`, inside `text`.
pub fn translate(text: &str, old_root: &Path, new_root: &Path, tracked: &[RepoPath]) -> String {
    let mut pairs: Vec<(String, String)> = tracked
        .iter()
        .map(|rel| {
            let old_abs = rel.to_absolute(old_root).to_string_lossy().into_owned();
            let new_abs = rel.to_absolute(new_root).to_string_lossy().into_owned();
            (old_abs, new_abs)
        })
        .collect();

    // Longest-old-path-first avoids a short path being replaced inside a
    // longer one that shares a prefix (e.g. "src/a.h" inside "src/a.hpp").
    pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = text.to_string();
    for (old_abs, new_abs) in pairs {
        out = out.replace(&old_abs, &new_abs);
    }
    out
}
