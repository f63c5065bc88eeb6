use std::path::PathBuf;

use thiserror::Error;

use crate::types::IndexKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The document's base artifact directory does not exist.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// A specific index kind was never built for the document.
    #[error("{kind} index unavailable for document {doc_id}")]
    IndexUnavailable { doc_id: String, kind: IndexKind },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upload failed for {local_id}: {reason}")]
    UploadFailed { local_id: String, reason: String },

    #[error("Cache record {} is corrupt: {reason}", path.display())]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation failed: {0}")]
    Operation(#[from] anyhow::Error),
}

impl Error {
    /// Hard failures abort the caller's operation; everything else degrades
    /// a single search path or batch item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DocumentNotFound(_) | Error::InvalidConfig(_) | Error::Operation(_)
        )
    }

    /// Short machine-readable tag used in structured results.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "invalid_config",
            Error::DocumentNotFound(_) => "document_not_found",
            Error::IndexUnavailable { .. } => "index_unavailable",
            Error::InvalidQuery(_) => "invalid_query",
            Error::NotFound(_) => "not_found",
            Error::UploadFailed { .. } => "upload_failed",
            Error::CacheCorrupt { .. } => "cache_corrupt",
            Error::Timeout(_) => "timeout",
            Error::Cancelled(_) => "cancelled",
            Error::Io(_) => "io",
            Error::Operation(_) => "operation",
        }
    }
}

/// Callers waiting on one shared load all receive the same failure. Source
/// chains of `Io` and `Operation` are flattened into their messages.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::InvalidConfig(m) => Error::InvalidConfig(m.clone()),
            Error::DocumentNotFound(m) => Error::DocumentNotFound(m.clone()),
            Error::IndexUnavailable { doc_id, kind } => Error::IndexUnavailable { doc_id: doc_id.clone(), kind: *kind },
            Error::InvalidQuery(m) => Error::InvalidQuery(m.clone()),
            Error::NotFound(m) => Error::NotFound(m.clone()),
            Error::UploadFailed { local_id, reason } => Error::UploadFailed { local_id: local_id.clone(), reason: reason.clone() },
            Error::CacheCorrupt { path, reason } => Error::CacheCorrupt { path: path.clone(), reason: reason.clone() },
            Error::Timeout(m) => Error::Timeout(m.clone()),
            Error::Cancelled(m) => Error::Cancelled(m.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
            Error::Operation(e) => Error::Operation(anyhow::anyhow!("{e:#}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
