use std::path::Path;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{DocType, IndexKind, ScoredHit};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Uniform query surface over one loaded, read-only index.
///
/// Handles are shared across concurrent searches; `close` may be called
/// while a search is in flight and must be idempotent. Searches issued after
/// `close` fail with `Error::IndexUnavailable`.
pub trait IndexHandle: Send + Sync {
    fn kind(&self) -> IndexKind;

    fn search<'a>(&'a self, query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<ScoredHit>>>;

    /// Search restricted to one stored document type. Handles that only hold
    /// a single type ignore the filter.
    fn search_doc_type<'a>(
        &'a self,
        query: &'a str,
        k: usize,
        _doc_type: DocType,
    ) -> BoxFuture<'a, Result<Vec<ScoredHit>>> {
        self.search(query, k)
    }

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Pushes a local file to the remote vision service and returns its handle.
pub trait Uploader: Send + Sync {
    fn upload<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, anyhow::Result<String>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}
