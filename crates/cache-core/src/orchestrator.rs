//! Glue: build a key, try a lookup, replay on hit, execute and store on
//! miss. The single entry point most embedders call.

use std::path::Path;
use std::process::Command;

use tracing::{info, instrument};

use crate::adapter::{OutputSnapshot, ToolAdapter};
use crate::cache_key::CacheKey;
use crate::error::{CacheError, Result};
use crate::file_metadata::FileMetadata;
use crate::repo_path::RepoPath;
use crate::store::{CacheStore, CapturedRun};

/// Outcome of one `run` call.
pub struct RunOutcome {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub cache_hit: bool,
}

/// Run `adapter` for `main_file`, consulting and updating `store`.
#[instrument(skip(store, adapter), fields(tool = %tool_name))]
pub fn run(
    store: &CacheStore,
    repo_root: &Path,
    main_file: &Path,
    tool_name: &str,
    tool_args: Vec<String>,
    raw_input_path_args: Vec<String>,
    adapter: &dyn ToolAdapter,
) -> Result<RunOutcome> {
    let source_path = RepoPath::new(repo_root, main_file, None)?;
    let source_size = std::fs::metadata(main_file)
        .map_err(|e| CacheError::io(format!("stat {main_file:?}"), e))?
        .len();

    let key = CacheKey::new(
        source_path.clone(),
        source_size,
        tool_name,
        tool_args,
        &raw_input_path_args,
        repo_root,
    );

    if let Some(hit) = store.lookup(&key, repo_root)? {
        info!(cache_key = %hit.cache_key, "cache hit");
        let outcome = store.restore(&key, &hit.cache_key, repo_root)?;
        return Ok(RunOutcome {
            returncode: outcome.returncode,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            cache_hit: true,
        });
    }

    info!("cache miss, running tool");
    let mut dependency_paths = vec![source_path.clone()];
    for dep in adapter.discover_dependencies(main_file, repo_root)? {
        if !dependency_paths.contains(&dep) {
            dependency_paths.push(dep);
        }
    }

    let patterns = adapter.output_patterns(main_file, repo_root);
    let before = OutputSnapshot::take(&patterns);

    let command = adapter.build_command(main_file);
    let (binary, args) = command
        .split_first()
        .ok_or_else(|| CacheError::ToolSpawnFailed {
            tool: tool_name.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

    let mut cmd = Command::new(binary);
    cmd.args(args).current_dir(repo_root);
    if let Some(env) = adapter.env() {
        cmd.envs(env);
    }

    let output = cmd.output().map_err(|e| CacheError::ToolSpawnFailed {
        tool: tool_name.to_string(),
        source: e,
    })?;

    let after = OutputSnapshot::take(&patterns);
    let artifacts = before.diff_produced(&after);

    let mut dependencies = Vec::with_capacity(dependency_paths.len());
    for path in dependency_paths {
        dependencies.push(FileMetadata::from_disk(path, repo_root)?);
    }

    let returncode = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if adapter.should_cache(returncode) {
        store.store(
            &key,
            repo_root,
            CapturedRun {
                dependencies,
                artifacts,
                stdout: stdout.clone(),
                stderr: stderr.clone(),
                returncode,
            },
        )?;
    }

    Ok(RunOutcome {
        returncode,
        stdout,
        stderr,
        cache_hit: false,
    })
}
