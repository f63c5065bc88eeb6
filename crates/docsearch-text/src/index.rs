use anyhow::Result;
use std::path::Path;
use tantivy::{Index, IndexWriter, TantivyDocument};
use tracing::info;

use docsearch_core::types::DocType;

use crate::tantivy_utils::{build_schema, register_tokenizer, LexicalFields};

/// One document of the lexical index as produced by the extraction pipeline.
#[derive(Debug, Clone)]
pub struct LexicalEntry {
    pub id: String,
    pub pdf: String,
    pub doc_type: DocType,
    pub order: u64,
    pub page_index: Option<u64>,
    /// Chunk or caption file; relative paths resolve against the document directory.
    pub path: String,
    pub content: String,
}

pub struct LexicalIndexWriter {
    index: Index,
    fields: LexicalFields,
}

impl LexicalIndexWriter {
    /// Create a fresh index in `index_dir`, replacing any previous artifact.
    pub fn create(index_dir: &Path) -> Result<Self> {
        let schema = build_schema();
        if index_dir.exists() { std::fs::remove_dir_all(index_dir)?; }
        std::fs::create_dir_all(index_dir)?;
        let index = Index::create_in_dir(index_dir, schema.clone())?;
        register_tokenizer(&index);
        let fields = LexicalFields::resolve(&schema)?;
        Ok(Self { index, fields })
    }

    pub fn write(&self, entries: &[LexicalEntry]) -> Result<usize> {
        let mut index_writer: IndexWriter = self.index.writer(50_000_000)?;
        for e in entries {
            let mut doc = TantivyDocument::default();
            doc.add_text(self.fields.id, &e.id);
            doc.add_text(self.fields.pdf, &e.pdf);
            doc.add_text(self.fields.doc_type, e.doc_type.as_str());
            doc.add_u64(self.fields.order, e.order);
            if let Some(page) = e.page_index { doc.add_u64(self.fields.page_index, page); }
            doc.add_text(self.fields.path, &e.path);
            doc.add_text(self.fields.content, &e.content);
            index_writer.add_document(doc)?;
        }
        index_writer.commit()?;
        info!(entries = entries.len(), "lexical index committed");
        Ok(entries.len())
    }
}
