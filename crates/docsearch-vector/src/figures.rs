use std::collections::HashMap;

use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};

use docsearch_core::types::FigureRecord;

use crate::schema::FIGURES_TABLE;
use crate::table::{figure_at, quoted_list, table_exists};

/// Figure metadata keyed by image id.
#[derive(Clone)]
pub struct FigureTable {
    table: Table,
}

impl FigureTable {
    /// `None` when the document has no figure table.
    pub async fn open(conn: &Connection) -> anyhow::Result<Option<Self>> {
        if !table_exists(conn, FIGURES_TABLE).await? { return Ok(None); }
        Ok(Some(Self { table: conn.open_table(FIGURES_TABLE).execute().await? }))
    }

    pub async fn lookup(&self, ids: &[String]) -> anyhow::Result<HashMap<String, FigureRecord>> {
        let mut out = HashMap::with_capacity(ids.len());
        if ids.is_empty() { return Ok(out); }
        let filter = format!("id IN ({})", quoted_list(ids));
        let mut stream = self.table.query().only_if(filter).execute().await?;
        while let Some(batch) = stream.try_next().await? {
            for i in 0..batch.num_rows() {
                let figure = figure_at(&batch, i)?;
                out.insert(figure.id.clone(), figure);
            }
        }
        Ok(out)
    }

    pub async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.table.count_rows(None).await?)
    }
}
