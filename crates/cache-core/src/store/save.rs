//! Store a captured tool run, deduplicating against existing entries that
//! share the same dependency set.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::cache_key::CacheKey;
use crate::error::{CacheError, Result};
use crate::folder_index::dependency_hash;
use crate::fs::{atomic_write, copy_file};
use crate::repo_path::RepoPath;

use super::{CacheStore, CapturedRun, EntryMetadata, METADATA_FILE_NAME};

pub fn store(
    store: &CacheStore,
    key: &CacheKey,
    repo_root: &Path,
    captured: CapturedRun,
) -> Result<String> {
    let dep_hash = dependency_hash(&captured.dependencies);
    let handle = store.folder_handle(key)?;
    let folder_dir = store.folder_dir(key);

    let mut index = handle.lock().expect("folder index mutex poisoned");

    if let Some(existing) = index.find_by_dep_hash(&dep_hash) {
        let existing = existing.to_string();
        info!(cache_key = %existing, "store: dep-hash dedup, reusing existing entry");
        // Reusing an existing entry directory still appends a fresh index
        // pointer rather than only rewriting the matched row in place — no
        // new id or entry directory is allocated, but the folder's entries
        // list grows so the next lookup sees the refreshed dependencies
        // first.
        index.append_dedup_pointer(existing.clone(), captured.dependencies.clone());
        index.persist()?;

        let entry_dir = folder_dir.join(&existing);
        if let Ok(bytes) = std::fs::read(entry_dir.join(METADATA_FILE_NAME)) {
            if let Ok(mut metadata) = serde_json::from_slice::<EntryMetadata>(&bytes) {
                metadata.dependencies = captured.dependencies;
                if let Ok(bytes) = serde_json::to_vec_pretty(&metadata) {
                    let _ = atomic_write(&entry_dir, METADATA_FILE_NAME, &bytes);
                }
            }
        }

        return Ok(existing);
    }

    let cache_key = index.allocate_entry_id();
    let entry_dir = folder_dir.join(&cache_key);
    std::fs::create_dir_all(&entry_dir)
        .map_err(|e| CacheError::io(format!("create entry dir {entry_dir:?}"), e))?;

    let mut stored_files: Vec<(RepoPath, PathBuf)> = Vec::with_capacity(captured.artifacts.len());
    for artifact in &captured.artifacts {
        let rel = match RepoPath::new(repo_root, artifact, None) {
            Ok(rp) => rp,
            Err(_) => {
                let basename = artifact
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "artifact".to_string());
                RepoPath::from_relative_str(&basename)
            }
        };
        stored_files.push((rel, artifact.clone()));
    }
    stored_files.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

    for (rel, src) in &stored_files {
        let dst = entry_dir.join(rel.as_str());
        copy_file(src, &dst)?;
    }

    let main_file_path = key.source_path.clone();
    let metadata = EntryMetadata {
        cache_key: cache_key.clone(),
        source_file: key.source_path.clone(),
        tool_name: key.tool_name.clone(),
        tool_args: key.tool_args.clone(),
        main_file_path,
        dependencies: captured.dependencies.clone(),
        files: stored_files.iter().map(|(rel, _)| rel.clone()).collect(),
        stdout: captured.stdout,
        stderr: captured.stderr,
        returncode: captured.returncode,
        repo_dir: repo_root.to_path_buf(),
    };
    let bytes = serde_json::to_vec_pretty(&metadata)
        .map_err(|e| CacheError::serde("encode metadata.json", e))?;
    atomic_write(&entry_dir, METADATA_FILE_NAME, &bytes)?;

    index.push_entry(cache_key.clone(), captured.dependencies);
    index.persist()?;

    info!(cache_key = %cache_key, "store: allocated new entry");
    Ok(cache_key)
}
