//! Error kinds for the cache engine.
//!
//! One flat enum rather than a hierarchy of sub-enums: this crate has a
//! single subsystem, and callers need to match on kind (`PathOutsideRepo`
//! vs `CacheCorrupt` vs ...), not drill through nested error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the cache engine.
///
/// `#[non_exhaustive]` so new kinds can be added without a breaking change
/// for downstream matchers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("path outside repository root: {path} (root: {root})")]
    PathOutsideRepo { path: PathBuf, root: PathBuf },

    #[error("cache entry corrupt at {path}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("restore incomplete: {failed} of {total} artifact copies failed")]
    RestoreIncomplete { failed: usize, total: usize },

    #[error("failed to spawn tool `{tool}`")]
    ToolSpawnFailed {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("index conflict for {path}: {reason}")]
    IndexConflict { path: PathBuf, reason: String },

    #[error("io error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {context}")]
    Serde {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn serde(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serde {
            context: context.into(),
            source,
        }
    }

    pub fn cache_corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CacheError>;
