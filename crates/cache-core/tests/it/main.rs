use std::path::PathBuf;

use tempfile::TempDir;

pub mod scenarios;

#[track_caller]
pub fn temp_repo() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp repo dir");
    let path = dir.path().to_path_buf();
    (dir, path)
}
