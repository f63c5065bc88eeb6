use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use docsearch_core::context::RequestContext;
use docsearch_core::error::{Error, Result};
use docsearch_core::traits::IndexHandle;
use docsearch_core::types::{DocType, HitAttributes, HitPayload, HitSource, IndexKind, ScoredHit};
use docsearch_hybrid::{HybridConfig, HybridRetrievalEngine, HybridWeights};

/// Returns fixed hits, optionally after a delay or as a failure.
struct StaticHandle {
    kind: IndexKind,
    hits: Vec<(&'static str, f32)>,
    delay: Option<Duration>,
    fail: bool,
    requested_k: AtomicUsize,
    doc_type: Mutex<Option<DocType>>,
}

impl StaticHandle {
    fn new(kind: IndexKind, hits: Vec<(&'static str, f32)>) -> Self {
        Self { kind, hits, delay: None, fail: false, requested_k: AtomicUsize::new(0), doc_type: Mutex::new(None) }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    async fn respond(&self, k: usize) -> Result<Vec<ScoredHit>> {
        self.requested_k.store(k, Ordering::SeqCst);
        if let Some(d) = self.delay { tokio::time::sleep(d).await; }
        if self.fail { return Err(Error::IndexUnavailable { doc_id: "paper".into(), kind: self.kind }); }
        Ok(self
            .hits
            .iter()
            .take(k)
            .map(|(id, score)| ScoredHit {
                item_id: id.to_string(),
                score: *score,
                source: self.kind.source(),
                payload: HitPayload {
                    content: format!("{id} from {}", self.kind),
                    attributes: HitAttributes::Text { doc_type: DocType::Chunk, order: None, page_index: None, path: None },
                },
            })
            .collect())
    }
}

impl IndexHandle for StaticHandle {
    fn kind(&self) -> IndexKind { self.kind }
    fn search<'a>(&'a self, _query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<ScoredHit>>> { self.respond(k).boxed() }
    fn search_doc_type<'a>(&'a self, _query: &'a str, k: usize, doc_type: DocType) -> BoxFuture<'a, Result<Vec<ScoredHit>>> {
        *self.doc_type.lock().unwrap() = Some(doc_type);
        self.respond(k).boxed()
    }
    fn close(&self) {}
    fn is_closed(&self) -> bool { false }
}

fn lexical() -> StaticHandle { StaticHandle::new(IndexKind::Lexical, vec![("c1", 0.9), ("c2", 0.5)]) }
fn vector() -> StaticHandle { StaticHandle::new(IndexKind::TextVector, vec![("c3", 0.95), ("c2", 0.8)]) }

fn ids(outcome: &docsearch_hybrid::HybridOutcome) -> Vec<&str> { outcome.hits.iter().map(|h| h.item_id.as_str()).collect() }

#[tokio::test]
async fn both_legs_merge_with_overfetch_and_chunk_scope() {
    let engine = HybridRetrievalEngine::new(HybridConfig::default());
    let (lex, vec) = (lexical(), vector());
    let out = engine.search(Some(&lex), Some(&vec), "flow", 5, None, &RequestContext::background()).await.unwrap();
    assert!(!out.degraded);
    assert!(out.leg_errors.is_empty());
    assert_eq!(ids(&out), vec!["c3", "c1", "c2"]);
    assert_eq!(lex.requested_k.load(Ordering::SeqCst), 15);
    assert_eq!(vec.requested_k.load(Ordering::SeqCst), 15);
    assert_eq!(*lex.doc_type.lock().unwrap(), Some(DocType::Chunk));
}

#[tokio::test]
async fn explicit_weights_override_the_configured_ones() {
    let engine = HybridRetrievalEngine::new(HybridConfig::default());
    let (lex, vec) = (lexical(), vector());
    let w = HybridWeights::new(0.9, 0.1).unwrap();
    let out = engine.search(Some(&lex), Some(&vec), "flow", 2, Some(w), &RequestContext::background()).await.unwrap();
    assert_eq!(ids(&out), vec!["c1", "c3"]);
}

#[tokio::test]
async fn lexical_only_document_is_degraded() {
    let engine = HybridRetrievalEngine::new(HybridConfig::default());
    let lex = lexical();
    let out = engine.search(Some(&lex), None, "flow", 5, None, &RequestContext::background()).await.unwrap();
    assert!(out.degraded);
    assert_eq!(ids(&out), vec!["c1", "c2"]);
    assert!(out.hits.iter().all(|h| h.sources() == vec![HitSource::Lexical]));
}

#[tokio::test(start_paused = true)]
async fn slow_leg_times_out_and_the_other_leg_is_used() {
    let config = HybridConfig { leg_timeout: Duration::from_millis(100), ..HybridConfig::default() };
    let engine = HybridRetrievalEngine::new(config);
    let lex = lexical();
    let vec = vector().slow(Duration::from_secs(30));
    let out = engine.search(Some(&lex), Some(&vec), "flow", 5, None, &RequestContext::background()).await.unwrap();
    assert!(out.degraded);
    assert_eq!(ids(&out), vec!["c1", "c2"]);
    assert_eq!(out.leg_errors.len(), 1);
    assert_eq!(out.leg_errors[0].kind, IndexKind::TextVector);
    assert_eq!(out.leg_errors[0].code, "timeout");
}

#[tokio::test]
async fn failing_leg_degrades_to_the_surviving_one() {
    let engine = HybridRetrievalEngine::new(HybridConfig::default());
    let lex = lexical().failing();
    let vec = vector();
    let out = engine.search(Some(&lex), Some(&vec), "flow", 5, None, &RequestContext::background()).await.unwrap();
    assert!(out.degraded);
    assert!(out.hits.iter().all(|h| h.sources() == vec![HitSource::Vector]));
    assert_eq!(out.leg_errors[0].code, "index_unavailable");
}

#[tokio::test]
async fn no_handles_or_all_failures_are_errors() {
    let engine = HybridRetrievalEngine::new(HybridConfig::default());
    let err = engine.search(None, None, "flow", 5, None, &RequestContext::background()).await.unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable { kind: IndexKind::Lexical, .. }));

    let (lex, vec) = (lexical().failing(), vector().failing());
    let err = engine.search(Some(&lex), Some(&vec), "flow", 5, None, &RequestContext::background()).await.unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable { kind: IndexKind::Lexical, .. }));
}

#[tokio::test]
async fn zero_k_returns_nothing_without_querying() {
    let engine = HybridRetrievalEngine::new(HybridConfig::default());
    let (lex, vec) = (lexical(), vector());
    let out = engine.search(Some(&lex), Some(&vec), "flow", 0, None, &RequestContext::background()).await.unwrap();
    assert!(out.hits.is_empty());
    assert_eq!(lex.requested_k.load(Ordering::SeqCst), 0);
}
