//! Parallel artifact restore, with absolute-path translation of captured
//! stdout/stderr across repo locations.
//!
//! Uses a synchronous `rayon` scoped thread pool rather than an async
//! runtime: every copy is a blocking syscall, so there is nothing for an
//! event loop to multiplex.

use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use tracing::warn;

use crate::cache_key::CacheKey;
use crate::error::{CacheError, Result};
use crate::fs::copy_file;
use crate::path_translator;
use crate::repo_path::RepoPath;

use super::{CacheStore, EntryMetadata, METADATA_FILE_NAME};

/// Generous per-artifact copy timeout. Artifacts are typically small
/// object files; this guards against a wedged disk/NFS mount rather than
/// against normal copy latency.
const COPY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RestoreOutcome {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

pub fn restore(
    store: &CacheStore,
    key: &CacheKey,
    cache_key: &str,
    repo_root: &Path,
) -> Result<RestoreOutcome> {
    let entry_dir = store.entry_dir(key, cache_key);
    let metadata_path = entry_dir.join(METADATA_FILE_NAME);
    let bytes = std::fs::read(&metadata_path)
        .map_err(|e| CacheError::io(format!("read {metadata_path:?}"), e))?;
    let metadata: EntryMetadata = serde_json::from_slice(&bytes).map_err(|e| {
        CacheError::cache_corrupt(metadata_path.clone(), format!("invalid metadata.json: {e}"))
    })?;

    // Create every unique parent directory up front, synchronously, to
    // avoid repeated mkdir contention inside the worker pool.
    let mut parents: Vec<_> = metadata
        .files
        .iter()
        .filter_map(|rel| rel.to_absolute(repo_root).parent().map(Path::to_path_buf))
        .collect();
    parents.sort();
    parents.dedup();
    for parent in &parents {
        std::fs::create_dir_all(parent)
            .map_err(|e| CacheError::io(format!("create dir {parent:?}"), e))?;
    }

    let total = metadata.files.len();
    let mut receivers = Vec::with_capacity(total);
    for rel in &metadata.files {
        let src = entry_dir.join(rel.as_str());
        let dst = rel.to_absolute(repo_root);
        let (tx, rx) = mpsc::channel();
        store.pool().spawn(move || {
            let result = copy_file(&src, &dst).is_ok();
            let _ = tx.send(result);
        });
        receivers.push((rel.clone(), rx));
    }

    let mut failed = 0usize;
    for (rel, rx) in receivers {
        match rx.recv_timeout(COPY_TIMEOUT) {
            Ok(true) => {}
            Ok(false) => {
                warn!(path = %rel, "restore: artifact copy failed");
                failed += 1;
            }
            Err(_) => {
                warn!(path = %rel, "restore: artifact copy timed out");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(CacheError::RestoreIncomplete { failed, total });
    }

    let tracked: Vec<RepoPath> = std::iter::once(metadata.source_file.clone())
        .chain(metadata.dependencies.iter().map(|d| d.path.clone()))
        .chain(metadata.files.iter().cloned())
        .collect();

    let old_repo_dir = metadata.repo_dir_or(repo_root);
    let stdout = path_translator::translate(&metadata.stdout, old_repo_dir, repo_root, &tracked);
    let stderr = path_translator::translate(&metadata.stderr, old_repo_dir, repo_root, &tracked);

    Ok(RestoreOutcome {
        returncode: metadata.returncode,
        stdout,
        stderr,
    })
}
