use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use anyhow::anyhow;
use arrow_array::{Float32Array, Int64Array, RecordBatch, StringArray};
use futures::future::BoxFuture;
use futures::{FutureExt, TryStreamExt};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tracing::debug;

use docsearch_core::error::{Error, Result};
use docsearch_core::traits::{Embedder, IndexHandle};
use docsearch_core::types::{DocType, HitAttributes, HitPayload, HitSource, IndexKind, ScoredHit};

use crate::schema::{CAPTIONS_TABLE, CHUNKS_TABLE};
use crate::table::{column, figure_at};

const TEXT_PREVIEW_CHARS: usize = 200;

/// Cosine search over one of a document's embedding tables: `chunks` for
/// [`IndexKind::TextVector`], `captions` for [`IndexKind::CaptionVector`].
pub struct VectorIndexHandle {
    doc_id: String,
    kind: IndexKind,
    table: RwLock<Option<Table>>,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndexHandle {
    pub fn table_name(kind: IndexKind) -> Option<&'static str> {
        match kind {
            IndexKind::TextVector => Some(CHUNKS_TABLE),
            IndexKind::CaptionVector => Some(CAPTIONS_TABLE),
            IndexKind::Lexical => None,
        }
    }

    pub async fn open(conn: &Connection, doc_id: &str, kind: IndexKind, embedder: Arc<dyn Embedder>) -> anyhow::Result<Self> {
        let name = Self::table_name(kind).ok_or_else(|| anyhow!("{kind} is not a vector index kind"))?;
        let table = conn.open_table(name).execute().await?;
        Ok(Self { doc_id: doc_id.to_string(), kind, table: RwLock::new(Some(table)), embedder })
    }

    fn table(&self) -> Result<Table> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::IndexUnavailable { doc_id: self.doc_id.clone(), kind: self.kind })
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let mut vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&[text]))
            .await
            .map_err(|e| Error::Operation(anyhow!("embedding task failed: {e}")))??;
        vectors.pop().ok_or_else(|| Error::Operation(anyhow!("embedder returned no vector")))
    }

    async fn run(&self, query: &str, k: usize) -> Result<Vec<ScoredHit>> {
        if k == 0 { return Ok(Vec::new()); }
        let table = self.table()?;
        if query.trim().is_empty() { return Err(Error::InvalidQuery("empty query".into())); }
        let started = Instant::now();
        let vector = self.embed_query(query).await?;
        let mut stream = table
            .vector_search(vector)
            .map_err(anyhow::Error::from)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(anyhow::Error::from)?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(anyhow::Error::from)? {
            for i in 0..batch.num_rows() {
                hits.push(self.hit_at(&batch, i)?);
            }
        }
        debug!(doc_id = %self.doc_id, kind = %self.kind, hits = hits.len(), elapsed_ms = started.elapsed().as_millis() as u64, "vector search");
        Ok(hits)
    }

    fn hit_at(&self, batch: &RecordBatch, i: usize) -> anyhow::Result<ScoredHit> {
        let distance = column::<Float32Array>(batch, "_distance")?.value(i);
        let (item_id, payload) = match self.kind {
            IndexKind::CaptionVector => {
                let figure = figure_at(batch, i)?;
                (figure.id.clone(), HitPayload { content: figure.caption.clone(), attributes: HitAttributes::Figure(figure) })
            }
            _ => {
                let content = column::<StringArray>(batch, "content")?.value(i);
                let attributes = HitAttributes::Text {
                    doc_type: DocType::Chunk,
                    order: u64::try_from(column::<Int64Array>(batch, "chunk_order")?.value(i)).ok(),
                    page_index: None,
                    path: Some(column::<StringArray>(batch, "source_path")?.value(i).to_string()),
                };
                (column::<StringArray>(batch, "id")?.value(i).to_string(), HitPayload { content: preview(content), attributes })
            }
        };
        Ok(ScoredHit { item_id, score: 1.0 - distance, source: HitSource::Vector, payload })
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= TEXT_PREVIEW_CHARS { return content.to_string(); }
    content.chars().take(TEXT_PREVIEW_CHARS).collect::<String>() + "..."
}

impl IndexHandle for VectorIndexHandle {
    fn kind(&self) -> IndexKind { self.kind }

    fn search<'a>(&'a self, query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<ScoredHit>>> {
        self.run(query, k).boxed()
    }

    fn close(&self) {
        if self.table.write().unwrap_or_else(PoisonError::into_inner).take().is_some() {
            debug!(doc_id = %self.doc_id, kind = %self.kind, "vector index closed");
        }
    }

    fn is_closed(&self) -> bool { self.table.read().unwrap_or_else(PoisonError::into_inner).is_none() }
}
