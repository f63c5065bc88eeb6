use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use anyhow::Context;
use futures::future::BoxFuture;
use futures::FutureExt;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use docsearch_core::config::resolve_with_base;
use docsearch_core::error::{Error, Result};
use docsearch_core::traits::IndexHandle;
use docsearch_core::types::{DocType, HitAttributes, HitPayload, HitSource, IndexKind, ScoredHit};

use crate::tantivy_utils::{register_tokenizer, LexicalFields};

struct LexicalInner {
    index: Index,
    reader: IndexReader,
    fields: LexicalFields,
    base_dir: PathBuf,
    preview_chars: usize,
}

/// Read-only handle over one document's lexical index directory.
pub struct LexicalIndexHandle {
    doc_id: String,
    inner: RwLock<Option<Arc<LexicalInner>>>,
}

impl LexicalIndexHandle {
    /// Open the index at `index_dir`. `base_dir` anchors relative `path`
    /// fields used for previews. Blocking.
    pub fn open(doc_id: &str, index_dir: &Path, base_dir: &Path, preview_chars: usize) -> anyhow::Result<Self> {
        let index = Index::open_in_dir(index_dir).with_context(|| format!("opening lexical index {}", index_dir.display()))?;
        register_tokenizer(&index);
        let fields = LexicalFields::resolve(&index.schema())?;
        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        let inner = LexicalInner { index, reader, fields, base_dir: base_dir.to_path_buf(), preview_chars };
        Ok(Self { doc_id: doc_id.to_string(), inner: RwLock::new(Some(Arc::new(inner))) })
    }

    fn inner(&self) -> Result<Arc<LexicalInner>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::IndexUnavailable { doc_id: self.doc_id.clone(), kind: IndexKind::Lexical })
    }

    async fn run(&self, query: String, k: usize, doc_type: Option<DocType>) -> Result<Vec<ScoredHit>> {
        if k == 0 { return Ok(Vec::new()); }
        let inner = self.inner()?;
        tokio::task::spawn_blocking(move || inner.search(&query, k, doc_type))
            .await
            .map_err(|e| Error::Operation(anyhow::anyhow!("lexical search task failed: {e}")))?
    }
}

impl LexicalInner {
    fn search(&self, query_text: &str, k: usize, doc_type: Option<DocType>) -> Result<Vec<ScoredHit>> {
        let started = Instant::now();
        let parser = QueryParser::for_index(&self.index, vec![self.fields.content]);
        let parsed = parser.parse_query(query_text).map_err(|e| Error::InvalidQuery(e.to_string()))?;
        let query: Box<dyn Query> = match doc_type {
            Some(t) => {
                let term = Term::from_field_text(self.fields.doc_type, t.as_str());
                let filter = ConstScoreQuery::new(Box::new(TermQuery::new(term, IndexRecordOption::Basic)), 0.0);
                Box::new(BooleanQuery::new(vec![(Occur::Must, parsed), (Occur::Must, Box::new(filter))]))
            }
            None => parsed,
        };

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(query.as_ref(), &TopDocs::with_limit(k)).map_err(anyhow::Error::from)?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(anyhow::Error::from)?;
            let text = |f: Field| doc.get_first(f).and_then(|v| v.as_str()).map(str::to_string);
            let number = |f: Field| doc.get_first(f).and_then(|v| v.as_u64());
            let path = text(self.fields.path);
            let content = path.as_deref().and_then(|p| read_preview(&resolve_with_base(&self.base_dir, p), self.preview_chars)).unwrap_or_default();
            hits.push(ScoredHit {
                item_id: text(self.fields.id).unwrap_or_default(),
                score,
                source: HitSource::Lexical,
                payload: HitPayload {
                    content,
                    attributes: HitAttributes::Text {
                        doc_type: text(self.fields.doc_type).as_deref().and_then(DocType::parse).unwrap_or(DocType::Chunk),
                        order: number(self.fields.order),
                        page_index: number(self.fields.page_index),
                        path,
                    },
                },
            });
        }
        debug!(query = query_text, hits = hits.len(), elapsed_ms = started.elapsed().as_millis() as u64, "lexical search");
        Ok(hits)
    }
}

/// First `max_chars` characters of the file with line breaks collapsed.
fn read_preview(path: &Path, max_chars: usize) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let flat = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars { return Some(flat); }
    let keep = max_chars.saturating_sub(3);
    Some(flat.chars().take(keep).collect::<String>() + "...")
}

impl IndexHandle for LexicalIndexHandle {
    fn kind(&self) -> IndexKind { IndexKind::Lexical }

    fn search<'a>(&'a self, query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<ScoredHit>>> {
        self.run(query.to_string(), k, None).boxed()
    }

    fn search_doc_type<'a>(&'a self, query: &'a str, k: usize, doc_type: DocType) -> BoxFuture<'a, Result<Vec<ScoredHit>>> {
        self.run(query.to_string(), k, Some(doc_type)).boxed()
    }

    fn close(&self) {
        if self.inner.write().unwrap_or_else(PoisonError::into_inner).take().is_some() {
            debug!(doc_id = %self.doc_id, "lexical index closed");
        }
    }

    fn is_closed(&self) -> bool { self.inner.read().unwrap_or_else(PoisonError::into_inner).is_none() }
}
