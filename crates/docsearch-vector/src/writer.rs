use anyhow::{ensure, Result};
use arrow_array::types::Float32Type;
use arrow_array::{BooleanArray, FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::Schema;
use lancedb::Connection;
use std::sync::Arc;
use tracing::info;

use docsearch_core::types::FigureRecord;

use crate::schema::{build_caption_schema, build_chunk_schema, build_figure_schema, CAPTIONS_TABLE, CHUNKS_TABLE, FIGURES_TABLE};
use crate::table::table_exists;

/// One embedded text chunk as produced by the extraction pipeline.
#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub id: String,
    pub order: i64,
    pub source_path: String,
    pub content: String,
}

/// Appends rows to a document's vector tables, creating them on first use.
pub struct VectorTableWriter {
    conn: Connection,
    dim: i32,
}

impl VectorTableWriter {
    pub fn new(conn: Connection, dim: usize) -> Result<Self> {
        Ok(Self { conn, dim: i32::try_from(dim)? })
    }

    pub async fn write_chunks(&self, rows: &[ChunkRow], vectors: &[Vec<f32>]) -> Result<usize> {
        if rows.is_empty() { return Ok(0); }
        ensure!(rows.len() == vectors.len(), "chunks and vectors length must match");
        let schema = build_chunk_schema(self.dim);
        let batch = RecordBatch::try_new(schema.clone(), vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.id.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.order))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.source_path.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.content.as_str()))),
            Arc::new(self.vector_column(vectors)?),
        ])?;
        self.insert(CHUNKS_TABLE, schema, batch).await?;
        Ok(rows.len())
    }

    pub async fn write_captions(&self, figures: &[FigureRecord], vectors: &[Vec<f32>]) -> Result<usize> {
        if figures.is_empty() { return Ok(0); }
        ensure!(figures.len() == vectors.len(), "figures and vectors length must match");
        let schema = build_caption_schema(self.dim);
        let mut columns = figure_columns(figures);
        columns.push(Arc::new(self.vector_column(vectors)?));
        let batch = RecordBatch::try_new(schema.clone(), columns)?;
        self.insert(CAPTIONS_TABLE, schema, batch).await?;
        Ok(figures.len())
    }

    /// Figure metadata for every extracted image, captioned or not.
    pub async fn write_figures(&self, figures: &[FigureRecord]) -> Result<usize> {
        if figures.is_empty() { return Ok(0); }
        let schema = build_figure_schema();
        let batch = RecordBatch::try_new(schema.clone(), figure_columns(figures))?;
        self.insert(FIGURES_TABLE, schema, batch).await?;
        Ok(figures.len())
    }

    fn vector_column(&self, vectors: &[Vec<f32>]) -> Result<FixedSizeListArray> {
        for v in vectors {
            ensure!(v.len() == self.dim as usize, "dim mismatch: got {} expected {}", v.len(), self.dim);
        }
        let values = vectors.iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>()));
        Ok(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(values, self.dim))
    }

    async fn insert(&self, table: &str, schema: Arc<Schema>, batch: RecordBatch) -> Result<()> {
        let rows = batch.num_rows();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        if table_exists(&self.conn, table).await? {
            self.conn.open_table(table).execute().await?.add(reader).execute().await?;
        } else {
            self.conn.create_table(table, reader).execute().await?;
        }
        info!(table, rows, "vector rows written");
        Ok(())
    }
}

fn figure_columns(figures: &[FigureRecord]) -> Vec<Arc<dyn arrow_array::Array>> {
    vec![
        Arc::new(StringArray::from_iter_values(figures.iter().map(|f| f.id.as_str()))),
        Arc::new(Int64Array::from_iter_values(figures.iter().map(|f| f.page_index))),
        Arc::new(Int64Array::from_iter_values(figures.iter().map(|f| f.image_index))),
        Arc::new(StringArray::from_iter_values(figures.iter().map(|f| f.image_path.as_str()))),
        Arc::new(BooleanArray::from(figures.iter().map(|f| f.has_caption).collect::<Vec<_>>())),
        Arc::new(StringArray::from_iter_values(figures.iter().map(|f| f.caption.as_str()))),
        Arc::new(Int64Array::from_iter_values(figures.iter().map(|f| f.width))),
        Arc::new(Int64Array::from_iter_values(figures.iter().map(|f| f.height))),
    ]
}
