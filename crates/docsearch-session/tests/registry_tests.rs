use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;

use docsearch_core::config::FileCacheSettings;
use docsearch_core::error::{Error, Result};
use docsearch_core::traits::{Clock, IndexHandle};
use docsearch_core::types::{DocumentId, IndexKind, ScoredHit};
use docsearch_session::{BundleLoader, BundleParts, ChunkStore, DocumentResourceBundle, ExternalResourceCache, MemoryStore, SessionRegistry};

struct ManualClock(AtomicI64);

impl ManualClock {
    fn new() -> Self { Self(AtomicI64::new(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap().timestamp_millis())) }
    fn advance(&self, secs: i64) { self.0.fetch_add(secs * 1000, Ordering::SeqCst); }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> { Utc.timestamp_millis_opt(self.0.load(Ordering::SeqCst)).unwrap() }
}

struct FakeHandle {
    closed: AtomicBool,
}

impl IndexHandle for FakeHandle {
    fn kind(&self) -> IndexKind { IndexKind::Lexical }
    fn search<'a>(&'a self, _query: &'a str, _k: usize) -> BoxFuture<'a, Result<Vec<ScoredHit>>> {
        futures::future::ready(Ok(Vec::new())).boxed()
    }
    fn close(&self) { self.closed.store(true, Ordering::SeqCst); }
    fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }
}

/// Counts loads per id and keeps every handle it created.
#[derive(Default)]
struct CountingLoader {
    delays: HashMap<&'static str, Duration>,
    loads: Mutex<HashMap<String, usize>>,
    handles: Mutex<Vec<(String, Arc<FakeHandle>)>>,
}

impl CountingLoader {
    fn with_delay(mut self, id: &'static str, d: Duration) -> Self {
        self.delays.insert(id, d);
        self
    }

    fn loads(&self, id: &str) -> usize { self.loads.lock().unwrap().get(id).copied().unwrap_or(0) }

    fn handles_for(&self, id: &str) -> Vec<Arc<FakeHandle>> {
        self.handles.lock().unwrap().iter().filter(|(d, _)| d == id).map(|(_, h)| Arc::clone(h)).collect()
    }
}

impl BundleLoader for CountingLoader {
    fn load<'a>(&'a self, doc_id: &'a DocumentId) -> BoxFuture<'a, Result<DocumentResourceBundle>> {
        async move {
            *self.loads.lock().unwrap().entry(doc_id.to_string()).or_default() += 1;
            if let Some(d) = self.delays.get(doc_id.as_str()) { tokio::time::sleep(*d).await; }
            if doc_id.as_str() == "missing" { return Err(Error::DocumentNotFound(doc_id.to_string())); }
            let handle = Arc::new(FakeHandle { closed: AtomicBool::new(false) });
            self.handles.lock().unwrap().push((doc_id.to_string(), Arc::clone(&handle)));
            let lexical: Arc<dyn IndexHandle> = handle;
            Ok(DocumentResourceBundle::new(BundleParts {
                doc_id: doc_id.clone(),
                base_dir: format!("/tmp/{doc_id}").into(),
                lexical: Some(lexical),
                text_vector: None,
                caption_vector: None,
                figures: None,
                chunk_store: ChunkStore::new("/tmp/none"),
                metadata_table_path: "/tmp/none".into(),
                manifest: None,
                file_cache: ExternalResourceCache::open(Arc::new(MemoryStore::new()), &FileCacheSettings::default(), Utc::now()),
            }))
        }
        .boxed()
    }
}

fn setup(capacity: usize, loader: CountingLoader) -> (Arc<SessionRegistry>, Arc<CountingLoader>, Arc<ManualClock>) {
    let loader = Arc::new(loader);
    let clock = Arc::new(ManualClock::new());
    let registry = Arc::new(SessionRegistry::new(capacity, loader.clone(), clock.clone()).unwrap());
    (registry, loader, clock)
}

fn id(s: &str) -> DocumentId { DocumentId::from(s) }

#[tokio::test]
async fn least_recently_used_bundle_is_evicted_and_closed() {
    let (registry, loader, clock) = setup(2, CountingLoader::default());
    let a = registry.ensure(&id("A")).await.unwrap();
    clock.advance(1);
    registry.ensure(&id("B")).await.unwrap();
    clock.advance(1);
    registry.ensure(&id("C")).await.unwrap();

    assert_eq!(registry.size(), 2);
    assert_eq!(registry.resident(), vec![id("C"), id("B")]);
    assert!(a.is_closed());
    assert!(loader.handles_for("A")[0].is_closed());
    assert!(!loader.handles_for("B")[0].is_closed());
}

#[tokio::test]
async fn access_refreshes_recency() {
    let (registry, _loader, clock) = setup(2, CountingLoader::default());
    registry.ensure(&id("A")).await.unwrap();
    clock.advance(1);
    registry.ensure(&id("B")).await.unwrap();
    clock.advance(1);
    registry.ensure(&id("A")).await.unwrap();
    clock.advance(1);
    registry.ensure(&id("C")).await.unwrap();
    assert_eq!(registry.resident(), vec![id("C"), id("A")]);
}

#[tokio::test]
async fn equal_timestamps_evict_the_earliest_inserted() {
    let (registry, _loader, _clock) = setup(2, CountingLoader::default());
    registry.ensure(&id("A")).await.unwrap();
    registry.ensure(&id("B")).await.unwrap();
    registry.ensure(&id("A")).await.unwrap();
    registry.ensure(&id("C")).await.unwrap();
    assert!(!registry.contains(&id("A")));
    assert!(registry.contains(&id("B")) && registry.contains(&id("C")));
}

#[tokio::test]
async fn repeated_ensure_returns_identical_handles() {
    let (registry, loader, _clock) = setup(4, CountingLoader::default());
    let first = registry.ensure(&id("X")).await.unwrap();
    let second = registry.ensure(&id("X")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(first.lexical().unwrap(), second.lexical().unwrap()));
    assert_eq!(loader.loads("X"), 1);
}

#[tokio::test]
async fn concurrent_ensure_for_one_id_loads_once() {
    let (registry, loader, _clock) = setup(4, CountingLoader::default().with_delay("X", Duration::from_millis(50)));
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.ensure(&id("X")).await.unwrap() })
        })
        .collect();
    let mut bundles = Vec::new();
    for t in tasks { bundles.push(t.await.unwrap()); }

    assert_eq!(loader.loads("X"), 1);
    assert!(bundles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(registry.size(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_load_does_not_block_other_documents() {
    let (registry, _loader, _clock) = setup(4, CountingLoader::default().with_delay("slow", Duration::from_secs(5)));
    let slow = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.ensure(&id("slow")).await })
    };
    tokio::task::yield_now().await;
    let fast = tokio::time::timeout(Duration::from_millis(100), registry.ensure(&id("fast"))).await;
    assert!(fast.is_ok(), "fast document waited on the slow load");
    assert!(registry.contains(&id("fast")));
    assert!(!registry.contains(&id("slow")));
    slow.await.unwrap().unwrap();
    assert_eq!(registry.size(), 2);
}

#[tokio::test]
async fn size_never_exceeds_capacity() {
    let (registry, _loader, clock) = setup(3, CountingLoader::default());
    for (step, name) in ["a", "b", "c", "d", "a", "e", "b", "f", "c", "a", "d", "d", "e"].iter().enumerate() {
        registry.ensure(&id(name)).await.unwrap();
        clock.advance(step as i64 % 2);
        assert!(registry.size() <= 3, "size {} after {name}", registry.size());
    }
}

#[tokio::test]
async fn missing_document_is_an_error_and_not_cached() {
    let (registry, loader, _clock) = setup(2, CountingLoader::default());
    let err = registry.ensure(&id("missing")).await.unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound(_)));
    assert!(err.is_fatal());
    assert_eq!(registry.size(), 0);
    assert!(registry.ensure(&id("missing")).await.is_err());
    assert_eq!(loader.loads("missing"), 2);
}

#[tokio::test]
async fn concurrent_ensure_of_a_failing_document_loads_once() {
    let (registry, loader, _clock) = setup(2, CountingLoader::default().with_delay("missing", Duration::from_millis(50)));
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.ensure(&id("missing")).await })
        })
        .collect();
    for t in tasks {
        let err = t.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(ref d) if d == "missing"), "{err}");
    }
    assert_eq!(loader.loads("missing"), 1);
    assert_eq!(registry.size(), 0);

    assert!(registry.ensure(&id("missing")).await.is_err());
    assert_eq!(loader.loads("missing"), 2, "a settled failure is retried");
}

#[tokio::test]
async fn invalidate_closes_and_forces_a_reload() {
    let (registry, loader, _clock) = setup(2, CountingLoader::default());
    let before = registry.ensure(&id("A")).await.unwrap();
    assert!(registry.invalidate(&id("A")).await);
    assert!(before.is_closed());
    assert!(!registry.invalidate(&id("A")).await);

    let after = registry.ensure(&id("A")).await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(!after.is_closed());
    assert_eq!(loader.loads("A"), 2);
}

#[tokio::test]
async fn invalidate_during_load_discards_the_stale_bundle() {
    let (registry, loader, _clock) = setup(2, CountingLoader::default().with_delay("A", Duration::from_millis(100)));
    let pending = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.ensure(&id("A")).await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!registry.invalidate(&id("A")).await, "nothing resident yet");

    let bundle = pending.await.unwrap();
    assert!(!bundle.is_closed());
    assert_eq!(loader.loads("A"), 2);
    let handles = loader.handles_for("A");
    assert!(handles[0].is_closed(), "stale load was closed");
    assert!(!handles[1].is_closed());
}

#[tokio::test]
async fn bundle_close_is_idempotent_and_shutdown_closes_everything() {
    let (registry, loader, _clock) = setup(4, CountingLoader::default());
    let a = registry.ensure(&id("A")).await.unwrap();
    let b = registry.ensure(&id("B")).await.unwrap();
    a.close();
    a.close();
    assert!(a.is_closed());

    registry.shutdown().await;
    assert_eq!(registry.size(), 0);
    assert!(b.is_closed());
    assert!(loader.handles_for("B")[0].is_closed());
}

#[test]
fn zero_capacity_is_rejected() {
    let err = SessionRegistry::new(0, Arc::new(CountingLoader::default()), Arc::new(ManualClock::new())).err().unwrap();
    assert!(matches!(err, Error::InvalidConfig(_)));
}
