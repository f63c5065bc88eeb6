//! LanceDB connection and column helpers shared by the writer, the search
//! handles and the figure table.
use anyhow::{anyhow, Result};
use arrow_array::{Array, BooleanArray, Int64Array, RecordBatch, StringArray};
use lancedb::{connect, Connection};
use std::path::Path;

use docsearch_core::types::FigureRecord;

pub async fn open_db(path: &Path) -> Result<Connection> {
    Ok(connect(path.to_string_lossy().as_ref()).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

pub(crate) fn column<'b, T: Array + 'static>(batch: &'b RecordBatch, name: &str) -> Result<&'b T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{name}' missing or of unexpected type"))
}

/// Decode row `i` of a batch holding the figure columns.
pub(crate) fn figure_at(batch: &RecordBatch, i: usize) -> Result<FigureRecord> {
    Ok(FigureRecord {
        id: column::<StringArray>(batch, "id")?.value(i).to_string(),
        page_index: column::<Int64Array>(batch, "page_index")?.value(i),
        image_index: column::<Int64Array>(batch, "image_index")?.value(i),
        image_path: column::<StringArray>(batch, "image_path")?.value(i).to_string(),
        has_caption: column::<BooleanArray>(batch, "has_caption")?.value(i),
        caption: column::<StringArray>(batch, "caption")?.value(i).to_string(),
        width: column::<Int64Array>(batch, "width")?.value(i),
        height: column::<Int64Array>(batch, "height")?.value(i),
    })
}

/// SQL `IN (...)` list with single quotes escaped.
pub(crate) fn quoted_list(ids: &[String]) -> String {
    ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect::<Vec<_>>().join(",")
}
