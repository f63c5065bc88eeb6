//! Caller-facing document operations. Every call resolves its bundle through
//! the registry, so documents load lazily and stay bounded in memory.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use docsearch_core::config::resolve_with_base;
use docsearch_core::context::RequestContext;
use docsearch_core::error::{Error, Result};
use docsearch_core::traits::{Clock, IndexHandle, Uploader};
use docsearch_core::types::{DocType, DocumentId, FigureRecord, IndexKind, ScoredHit};
use docsearch_hybrid::{HybridOutcome, HybridRetrievalEngine, HybridWeights};

use crate::bundle::DocumentResourceBundle;
use crate::chunks::ChunkFetch;
use crate::file_cache::{Fetched, UploadItem};
use crate::registry::SessionRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for ItemError {
    fn from(e: &Error) -> Self { Self { code: e.code().to_string(), message: e.to_string() } }
}

/// Per-image result of `upload_images`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub image_id: String,
    pub remote_handle: Option<String>,
    pub cached: bool,
    pub caption: Option<String>,
    pub page_index: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub image_path: Option<String>,
    pub error: Option<ItemError>,
}

impl UploadedImage {
    fn not_found(image_id: &str) -> Self {
        Self::failed(image_id, None, &Error::NotFound(format!("image {image_id}")))
    }

    fn failed(image_id: &str, figure: Option<&FigureRecord>, err: &Error) -> Self {
        let mut item = Self::from_figure(image_id, figure);
        item.error = Some(ItemError::from(err));
        item
    }

    fn from_figure(image_id: &str, figure: Option<&FigureRecord>) -> Self {
        Self {
            image_id: image_id.to_string(),
            remote_handle: None,
            cached: false,
            caption: figure.map(|f| f.caption.clone()).filter(|c| !c.is_empty()),
            page_index: figure.map(|f| f.page_index),
            width: figure.map(|f| f.width),
            height: figure.map(|f| f.height),
            image_path: figure.map(|f| f.image_path.clone()),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    pub items: Vec<UploadedImage>,
    pub uploaded: usize,
    pub cached: usize,
    pub failed: usize,
    pub truncated: bool,
    pub remaining: usize,
}

impl UploadReport {
    /// Image content blocks referencing the uploaded files, for a vision request.
    pub fn image_content_blocks(&self) -> Vec<serde_json::Value> {
        self.items
            .iter()
            .filter_map(|i| i.remote_handle.as_ref())
            .map(|id| json!({ "type": "image", "source": { "type": "file", "file_id": id } }))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub doc_id: DocumentId,
    pub lexical: bool,
    pub text_vector: bool,
    pub caption_vector: bool,
    pub figures: bool,
    pub chunk_count: usize,
    pub cached_files: usize,
    pub manifest: Option<serde_json::Value>,
    /// Registry residents after this call, most recently used first.
    pub resident: Vec<DocumentId>,
}

pub struct DocumentService {
    registry: Arc<SessionRegistry>,
    engine: HybridRetrievalEngine,
    uploader: Arc<dyn Uploader>,
    clock: Arc<dyn Clock>,
    batch_limit: usize,
}

impl DocumentService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        engine: HybridRetrievalEngine,
        uploader: Arc<dyn Uploader>,
        clock: Arc<dyn Clock>,
        batch_limit: usize,
    ) -> Self {
        Self { registry, engine, uploader, clock, batch_limit: batch_limit.max(1) }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> { &self.registry }

    fn require(bundle: &DocumentResourceBundle, kind: IndexKind) -> Result<&Arc<dyn IndexHandle>> {
        bundle
            .handle(kind)
            .ok_or_else(|| Error::IndexUnavailable { doc_id: bundle.doc_id().to_string(), kind })
    }

    /// BM25 search; `doc_type` restricts to chunks or image captions.
    pub async fn search_lexical(
        &self,
        doc_id: &DocumentId,
        query: &str,
        limit: usize,
        doc_type: Option<DocType>,
        ctx: &RequestContext,
    ) -> Result<Vec<ScoredHit>> {
        let bundle = self.registry.ensure(doc_id).await?;
        let handle = Self::require(&bundle, IndexKind::Lexical)?;
        match doc_type {
            Some(t) => ctx.run("lexical search", handle.search_doc_type(query, limit, t)).await,
            None => ctx.run("lexical search", handle.search(query, limit)).await,
        }
    }

    pub async fn search_vector(&self, doc_id: &DocumentId, query: &str, k: usize, ctx: &RequestContext) -> Result<Vec<ScoredHit>> {
        let bundle = self.registry.ensure(doc_id).await?;
        let handle = Self::require(&bundle, IndexKind::TextVector)?;
        ctx.run("vector search", handle.search(query, k)).await
    }

    /// Vector search over caption embeddings; hits carry the figure record.
    pub async fn search_captions(&self, doc_id: &DocumentId, query: &str, k: usize, ctx: &RequestContext) -> Result<Vec<ScoredHit>> {
        let bundle = self.registry.ensure(doc_id).await?;
        let handle = Self::require(&bundle, IndexKind::CaptionVector)?;
        ctx.run("caption search", handle.search(query, k)).await
    }

    pub async fn hybrid_search(
        &self,
        doc_id: &DocumentId,
        query: &str,
        k: usize,
        weights: Option<HybridWeights>,
        ctx: &RequestContext,
    ) -> Result<HybridOutcome> {
        let bundle = self.registry.ensure(doc_id).await?;
        let (lexical, vector) = (bundle.lexical().map(Arc::as_ref), bundle.text_vector().map(Arc::as_ref));
        if lexical.is_none() && vector.is_none() {
            return Err(Error::IndexUnavailable { doc_id: doc_id.to_string(), kind: IndexKind::Lexical });
        }
        self.engine.search(lexical, vector, query, k, weights, ctx).await
    }

    pub async fn get_chunks(&self, doc_id: &DocumentId, chunk_ids: &[String]) -> Result<ChunkFetch> {
        let bundle = self.registry.ensure(doc_id).await?;
        let store = bundle.chunk_store().clone();
        let ids = chunk_ids.to_vec();
        tokio::task::spawn_blocking(move || store.get_chunks(&ids))
            .await
            .map_err(|e| Error::Operation(anyhow::anyhow!("chunk read task failed: {e}")))
    }

    /// Upload (or reuse cached handles for) the requested figures. At most
    /// `limit` ids are processed; the rest are reported as `remaining`.
    pub async fn upload_images(
        &self,
        doc_id: &DocumentId,
        image_ids: &[String],
        limit: Option<usize>,
        ctx: &RequestContext,
    ) -> Result<UploadReport> {
        let bundle = self.registry.ensure(doc_id).await?;
        let limit = limit.unwrap_or(self.batch_limit);
        let head = &image_ids[..image_ids.len().min(limit)];
        let mut report = UploadReport { truncated: image_ids.len() > head.len(), remaining: image_ids.len() - head.len(), ..UploadReport::default() };

        let figures = match bundle.figures() {
            Some(source) => source.lookup(head).await.map_err(Error::Operation)?,
            None => {
                warn!(doc_id = %doc_id, "no figure metadata; every image id is unknown");
                Default::default()
            }
        };
        let items: Vec<UploadItem> = head
            .iter()
            .filter_map(|id| {
                figures.get(id).map(|f| UploadItem { local_id: id.clone(), source_path: resolve_with_base(bundle.base_dir(), &f.image_path) })
            })
            .collect();
        let batch = bundle.file_cache().batch_get_or_upload(&items, self.uploader.as_ref(), self.clock.now(), items.len(), ctx).await;
        let mut outcomes = batch.results.into_iter();

        for id in head {
            let Some(figure) = figures.get(id) else {
                report.failed += 1;
                report.items.push(UploadedImage::not_found(id));
                continue;
            };
            let Some(outcome) = outcomes.next() else { break };
            match outcome.result {
                Ok(Fetched { remote_handle, cached, .. }) => {
                    if cached { report.cached += 1 } else { report.uploaded += 1 }
                    let mut item = UploadedImage::from_figure(id, Some(figure));
                    item.remote_handle = Some(remote_handle);
                    item.cached = cached;
                    report.items.push(item);
                }
                Err(e) => {
                    report.failed += 1;
                    report.items.push(UploadedImage::failed(id, Some(figure), &e));
                }
            }
        }
        Ok(report)
    }

    pub async fn status(&self, doc_id: &DocumentId) -> Result<DocumentStatus> {
        let bundle = self.registry.ensure(doc_id).await?;
        let store = bundle.chunk_store().clone();
        let chunk_count = tokio::task::spawn_blocking(move || store.list().len())
            .await
            .map_err(|e| Error::Operation(anyhow::anyhow!("chunk listing task failed: {e}")))?;
        Ok(DocumentStatus {
            doc_id: doc_id.clone(),
            lexical: bundle.lexical().is_some(),
            text_vector: bundle.text_vector().is_some(),
            caption_vector: bundle.caption_vector().is_some(),
            figures: bundle.figures().is_some(),
            chunk_count,
            cached_files: bundle.file_cache().entries(self.clock.now()).len(),
            manifest: bundle.manifest().cloned(),
            resident: self.registry.resident(),
        })
    }
}
