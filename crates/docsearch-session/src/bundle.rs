use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};

use docsearch_core::traits::IndexHandle;
use docsearch_core::types::{DocumentId, FigureRecord, IndexKind};
use docsearch_vector::FigureTable;

use crate::chunks::ChunkStore;
use crate::file_cache::ExternalResourceCache;

/// Figure metadata lookup by image id.
pub trait FigureSource: Send + Sync {
    fn lookup<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, anyhow::Result<HashMap<String, FigureRecord>>>;
}

impl FigureSource for FigureTable {
    fn lookup<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, anyhow::Result<HashMap<String, FigureRecord>>> {
        FigureTable::lookup(self, ids).boxed()
    }
}

impl FigureSource for HashMap<String, FigureRecord> {
    fn lookup<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, anyhow::Result<HashMap<String, FigureRecord>>> {
        let found = ids.iter().filter_map(|id| self.get(id).map(|f| (id.clone(), f.clone()))).collect();
        futures::future::ready(Ok(found)).boxed()
    }
}

/// Everything loaded for one document. Index fields are `None` when that
/// artifact was never built.
pub struct BundleParts {
    pub doc_id: DocumentId,
    pub base_dir: PathBuf,
    pub lexical: Option<Arc<dyn IndexHandle>>,
    pub text_vector: Option<Arc<dyn IndexHandle>>,
    pub caption_vector: Option<Arc<dyn IndexHandle>>,
    pub figures: Option<Arc<dyn FigureSource>>,
    pub chunk_store: ChunkStore,
    pub metadata_table_path: PathBuf,
    pub manifest: Option<serde_json::Value>,
    pub file_cache: ExternalResourceCache,
}

/// Owns one document's resources. Holds no search logic.
pub struct DocumentResourceBundle {
    parts: BundleParts,
    last_accessed: AtomicI64,
    closed: AtomicBool,
}

impl DocumentResourceBundle {
    pub fn new(parts: BundleParts) -> Self {
        Self { parts, last_accessed: AtomicI64::new(0), closed: AtomicBool::new(false) }
    }

    pub fn doc_id(&self) -> &DocumentId { &self.parts.doc_id }
    pub fn base_dir(&self) -> &Path { &self.parts.base_dir }
    pub fn lexical(&self) -> Option<&Arc<dyn IndexHandle>> { self.parts.lexical.as_ref() }
    pub fn text_vector(&self) -> Option<&Arc<dyn IndexHandle>> { self.parts.text_vector.as_ref() }
    pub fn caption_vector(&self) -> Option<&Arc<dyn IndexHandle>> { self.parts.caption_vector.as_ref() }
    pub fn figures(&self) -> Option<&Arc<dyn FigureSource>> { self.parts.figures.as_ref() }
    pub fn chunk_store(&self) -> &ChunkStore { &self.parts.chunk_store }
    pub fn metadata_table_path(&self) -> &Path { &self.parts.metadata_table_path }
    pub fn manifest(&self) -> Option<&serde_json::Value> { self.parts.manifest.as_ref() }
    pub fn file_cache(&self) -> &ExternalResourceCache { &self.parts.file_cache }

    pub fn handle(&self, kind: IndexKind) -> Option<&Arc<dyn IndexHandle>> {
        match kind {
            IndexKind::Lexical => self.lexical(),
            IndexKind::TextVector => self.text_vector(),
            IndexKind::CaptionVector => self.caption_vector(),
        }
    }

    /// Milliseconds since the epoch of the latest access.
    pub fn last_accessed(&self) -> i64 { self.last_accessed.load(Ordering::SeqCst) }

    pub(crate) fn touch(&self, now_ms: i64) { self.last_accessed.fetch_max(now_ms, Ordering::SeqCst); }

    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }

    /// Close every present index handle and persist the file cache. Only the
    /// first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) { return; }
        for handle in [&self.parts.lexical, &self.parts.text_vector, &self.parts.caption_vector].into_iter().flatten() {
            handle.close();
        }
        if let Err(e) = self.parts.file_cache.flush() {
            warn!(doc_id = %self.parts.doc_id, error = %e, "file cache flush failed on close");
        }
        info!(doc_id = %self.parts.doc_id, "document bundle closed");
    }
}
