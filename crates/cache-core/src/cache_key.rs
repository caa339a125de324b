//! Compound cache key construction, input-path-argument translation, and
//! the deterministic folder-name encoding used to locate a key's on-disk
//! folder.

use std::path::Path;

use blake2::Blake2b;
use blake2::digest::{Digest, consts::U8};
use serde::{Deserialize, Serialize};

use crate::repo_path::RepoPath;

/// Compound identity of a cacheable invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    pub source_path: RepoPath,
    pub source_size: u64,
    pub tool_name: String,
    pub tool_args: Vec<String>,
    /// Already translated: repo-internal paths rewritten relative,
    /// outside-repo paths omitted, flags passed through. See
    /// [`translate_input_path_args`].
    pub input_path_args: Vec<String>,
}

impl CacheKey {
    pub fn new(
        source_path: RepoPath,
        source_size: u64,
        tool_name: impl Into<String>,
        tool_args: Vec<String>,
        raw_input_path_args: &[String],
        repo_root: &Path,
    ) -> Self {
        let input_path_args = translate_input_path_args(raw_input_path_args, repo_root);
        Self {
            source_path,
            source_size,
            tool_name: tool_name.into(),
            tool_args,
            input_path_args,
        }
    }

    /// The compound key's canonical string form, also stored verbatim as
    /// `folder_index.json`'s `compound_key` field.
    pub fn compound_key_string(&self) -> String {
        let args = serde_json::to_string(&self.tool_args).unwrap_or_default();
        let input_args = serde_json::to_string(&self.input_path_args).unwrap_or_default();
        format!(
            "{}::{}::{}::{}::{}",
            self.source_path, self.source_size, self.tool_name, args, input_args
        )
    }

    /// Deterministic, filesystem-safe, collision-free directory name for
    /// this key's folder under the cache root. A pure function of the key.
    pub fn folder_name(&self) -> String {
        let compound = self.compound_key_string();
        let escaped = escape_path_component(&compound);
        // Guard against platform filename-length limits: fall back to a
        // hashed form when the escaped string would be unwieldy, still
        // keeping a short human-legible prefix for debuggability.
        const MAX_LEN: usize = 180;
        if escaped.len() <= MAX_LEN {
            escaped
        } else {
            let mut hasher = Blake2b::<U8>::new();
            hasher.update(compound.as_bytes());
            let digest = hex::encode(hasher.finalize());
            format!("{}__{}", &escaped[..MAX_LEN], digest)
        }
    }
}

/// Escape characters illegal (or awkward) in a single path component.
fn escape_path_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => {
                out.push('%');
                out.push_str(&format!("{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Translate `input_path_args` for cache-key portability.
///
/// - Arguments that look like flags (leading `-`) pass through unchanged,
///   with no attempted path resolution. `input_path_args` is meant to
///   hold only the path-valued arguments an adapter pulled out
///   specifically (e.g. the `<path>` half of `-include <path>`); a
///   leading `-` catches an adapter passing the flag token itself
///   through by mistake.
/// - Everything else is attempted as a path. Arguments that resolve (via
///   [`RepoPath`] rules) inside `repo_root` are rewritten to their
///   repo-relative POSIX form.
/// - Arguments that resolve outside `repo_root`, or that fail to parse
///   as a path at all, are **omitted** entirely — so that two
///   invocations differing only in an outside-repo path collapse to the
///   same key — deliberate, so the cache stays portable across hosts
///   whose outside-repo layouts differ. Note this deliberately does
///   *not* special-case a leading `/`: on this engine's target platforms
///   that denotes an absolute path, not a flag, and must be resolved
///   (and possibly dropped) the same as any other path.
fn translate_input_path_args(raw: &[String], repo_root: &Path) -> Vec<String> {
    let mut out = Vec::with_capacity(raw.len());
    for arg in raw {
        if arg.starts_with('-') {
            out.push(arg.clone());
            continue;
        }

        match RepoPath::new(repo_root, Path::new(arg), None) {
            Ok(rp) => out.push(rp.as_str().to_string()),
            Err(_) => {
                // Outside the repo, or unparseable as a path: drop it.
            }
        }
    }
    out
}
