pub mod cache;

use std::path::PathBuf;

use color_eyre::eyre::{Result, eyre};
use directories::ProjectDirs;

/// Default cache directory name under the user's cache directory.
const CACHE_DIR_NAME: &str = "cachegrind";

/// Resolve the cache root, in priority order: the `--cache-dir` flag,
/// then `CACHEGRIND_CACHE_DIR`, then the platform cache directory for
/// `cachegrind` (a `ProjectDirs`-derived default, overridable by env var).
pub fn resolve_cache_dir(override_dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.clone());
    }
    if let Ok(dir) = std::env::var("CACHEGRIND_CACHE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let dirs = ProjectDirs::from("", "", CACHE_DIR_NAME)
        .ok_or_else(|| eyre!("could not determine a cache directory for this platform"))?;
    Ok(dirs.cache_dir().to_path_buf())
}
