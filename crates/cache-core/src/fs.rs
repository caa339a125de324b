//! Small filesystem helpers: atomic write-temp-then-rename, bit-exact file
//! copy. Artifacts are stored uncompressed and unhashed on disk (see
//! `DESIGN.md`) — only the temp-then-rename durability pattern is shared
//! with a content-addressed store.

use std::path::Path;

use uuid::Uuid;

use crate::error::{CacheError, Result};

/// Write `contents` to `dir/name` atomically: write to a sibling temp
/// file in the same directory, then rename over the destination. Readers
/// therefore always see either the previous file or the complete new one,
/// never a partial write.
pub fn atomic_write(dir: &Path, name: &str, contents: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| CacheError::io(format!("create dir {dir:?}"), e))?;
    let dest = dir.join(name);
    let temp = dir.join(format!(".{name}.tmp.{}", Uuid::new_v4()));

    std::fs::write(&temp, contents)
        .map_err(|e| CacheError::io(format!("write temp file {temp:?}"), e))?;
    std::fs::rename(&temp, &dest).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        CacheError::io(format!("rename {temp:?} -> {dest:?}"), e)
    })?;
    Ok(())
}

/// Copy `src` to `dst` bit-exact, creating `dst`'s parent directory first.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CacheError::io(format!("create dir {parent:?}"), e))?;
    }
    std::fs::copy(src, dst)
        .map_err(|e| CacheError::io(format!("copy {src:?} -> {dst:?}"), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        atomic_write(dir.path(), "f.json", b"{}").unwrap();
        let read = std::fs::read(dir.path().join("f.json")).unwrap();
        assert_eq!(read, b"{}");
    }

    #[test]
    fn atomic_write_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        atomic_write(dir.path(), "f.json", b"old").unwrap();
        atomic_write(dir.path(), "f.json", b"new").unwrap();
        let read = std::fs::read(dir.path().join("f.json")).unwrap();
        assert_eq!(read, b"new");
    }

    #[test]
    fn copy_file_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        std::fs::write(&src, b"hello").unwrap();
        let dst = dir.path().join("nested/deep/dst.bin");
        copy_file(&src, &dst).unwrap();
        assert_eq!(std::fs::read(dst).unwrap(), b"hello");
    }
}
