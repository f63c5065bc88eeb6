//! Bounded, concurrency-safe map of loaded document bundles.
//!
//! Recency updates and eviction decisions happen under one short-lived
//! mutex. Loads run outside it; concurrent `ensure` calls for the same id
//! share one in-flight load through a `OnceCell`, and share its failure too.
//! A failed cell is dropped from the map so the next caller retries. Evicted
//! bundles are closed on the blocking pool after the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use docsearch_core::error::{Error, Result};
use docsearch_core::traits::Clock;
use docsearch_core::types::DocumentId;

use crate::bundle::DocumentResourceBundle;

/// Builds a bundle from a document's on-disk artifacts.
pub trait BundleLoader: Send + Sync {
    fn load<'a>(&'a self, doc_id: &'a DocumentId) -> BoxFuture<'a, Result<DocumentResourceBundle>>;
}

type LoadOutcome = std::result::Result<Arc<DocumentResourceBundle>, LoadFailure>;
type LoadCell = Arc<OnceCell<LoadOutcome>>;

struct Resident {
    bundle: Arc<DocumentResourceBundle>,
    /// Insertion order; breaks ties between equal access timestamps.
    seq: u64,
}

#[derive(Default)]
struct State {
    resident: HashMap<DocumentId, Resident>,
    loading: HashMap<DocumentId, LoadCell>,
    next_seq: u64,
}

#[derive(Clone)]
enum LoadFailure {
    Failed(Error),
    /// The id was invalidated while its load was in flight.
    Superseded,
}

pub struct SessionRegistry {
    capacity: usize,
    loader: Arc<dyn BundleLoader>,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl SessionRegistry {
    pub fn new(capacity: usize, loader: Arc<dyn BundleLoader>, clock: Arc<dyn Clock>) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig("registry capacity must be at least 1".into()));
        }
        Ok(Self { capacity, loader, clock, state: Mutex::new(State::default()) })
    }

    fn state(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    fn now_ms(&self) -> i64 { self.clock.now().timestamp_millis() }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn size(&self) -> usize { self.state().resident.len() }

    pub fn contains(&self, doc_id: &DocumentId) -> bool { self.state().resident.contains_key(doc_id) }

    /// Resident ids, most recently used first.
    pub fn resident(&self) -> Vec<DocumentId> {
        let state = self.state();
        let mut entries: Vec<(&DocumentId, i64, u64)> =
            state.resident.iter().map(|(id, r)| (id, r.bundle.last_accessed(), r.seq)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));
        entries.into_iter().map(|(id, _, _)| id.clone()).collect()
    }

    /// Return the resident bundle for `doc_id`, loading it if needed.
    pub async fn ensure(&self, doc_id: &DocumentId) -> Result<Arc<DocumentResourceBundle>> {
        loop {
            let cell = {
                let mut state = self.state();
                if let Some(r) = state.resident.get(doc_id) {
                    r.bundle.touch(self.now_ms());
                    debug!(doc_id = %doc_id, "registry hit");
                    return Ok(Arc::clone(&r.bundle));
                }
                Arc::clone(state.loading.entry(doc_id.clone()).or_default())
            };
            match cell.get_or_init(|| self.load_and_insert(doc_id, &cell)).await {
                Ok(bundle) => return Ok(Arc::clone(bundle)),
                Err(LoadFailure::Failed(e)) => return Err(e.clone()),
                Err(LoadFailure::Superseded) => continue,
            }
        }
    }

    async fn load_and_insert(&self, doc_id: &DocumentId, cell: &LoadCell) -> LoadOutcome {
        if !self.is_current(doc_id, cell) { return Err(LoadFailure::Superseded); }
        let started = Instant::now();
        let loaded = match self.loader.load(doc_id).await {
            Ok(b) => Arc::new(b),
            Err(e) => {
                let mut state = self.state();
                if state.loading.get(doc_id).is_some_and(|c| Arc::ptr_eq(c, cell)) {
                    state.loading.remove(doc_id);
                }
                return Err(LoadFailure::Failed(e));
            }
        };

        let evicted = {
            let mut state = self.state();
            if !state.loading.get(doc_id).is_some_and(|c| Arc::ptr_eq(c, cell)) {
                drop(state);
                close_all(vec![Arc::clone(&loaded)]).await;
                debug!(doc_id = %doc_id, "load superseded by invalidate; retrying");
                return Err(LoadFailure::Superseded);
            }
            state.loading.remove(doc_id);
            loaded.touch(self.now_ms());
            let seq = state.next_seq;
            state.next_seq += 1;
            state.resident.insert(doc_id.clone(), Resident { bundle: Arc::clone(&loaded), seq });
            self.evict_over_capacity(&mut state, doc_id)
        };

        info!(doc_id = %doc_id, elapsed_ms = started.elapsed().as_millis() as u64, "document bundle loaded");
        for (id, _) in &evicted {
            info!(doc_id = %id, "evicting least recently used bundle");
        }
        close_all(evicted.into_iter().map(|(_, b)| b).collect()).await;
        Ok(loaded)
    }

    fn is_current(&self, doc_id: &DocumentId, cell: &LoadCell) -> bool {
        self.state().loading.get(doc_id).is_some_and(|c| Arc::ptr_eq(c, cell))
    }

    /// Remove least recently used bundles (oldest access, then earliest
    /// insertion) until within capacity. `keep` is never chosen.
    fn evict_over_capacity(&self, state: &mut State, keep: &DocumentId) -> Vec<(DocumentId, Arc<DocumentResourceBundle>)> {
        let mut evicted = Vec::new();
        while state.resident.len() > self.capacity {
            let victim = state
                .resident
                .iter()
                .filter(|(id, _)| *id != keep)
                .min_by_key(|(_, r)| (r.bundle.last_accessed(), r.seq))
                .map(|(id, _)| id.clone());
            let Some(id) = victim else { break };
            if let Some(r) = state.resident.remove(&id) {
                evicted.push((id, r.bundle));
            }
        }
        evicted
    }

    /// Evict and close `doc_id` if resident. An in-flight load for it is
    /// discarded and the next `ensure` reloads from disk. Returns whether a
    /// resident bundle was removed.
    pub async fn invalidate(&self, doc_id: &DocumentId) -> bool {
        let removed = {
            let mut state = self.state();
            state.loading.remove(doc_id);
            state.resident.remove(doc_id)
        };
        match removed {
            Some(r) => {
                info!(doc_id = %doc_id, "document bundle invalidated");
                close_all(vec![r.bundle]).await;
                true
            }
            None => false,
        }
    }

    /// Close every resident bundle and forget in-flight loads.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut state = self.state();
            state.loading.clear();
            state.resident.drain().map(|(_, r)| r.bundle).collect()
        };
        let closed = drained.len();
        close_all(drained).await;
        info!(closed, "session registry shut down");
    }
}

/// Closing flushes the file cache to disk.
async fn close_all(bundles: Vec<Arc<DocumentResourceBundle>>) {
    if bundles.is_empty() { return; }
    let closed = tokio::task::spawn_blocking(move || {
        for bundle in &bundles {
            bundle.close();
        }
    });
    if let Err(e) = closed.await {
        warn!(error = %e, "closing bundles failed");
    }
}
