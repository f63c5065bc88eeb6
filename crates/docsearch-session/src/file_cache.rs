//! Time-bounded cache of remote file handles for one document.
//!
//! The record is a JSON object keyed by local image id. Writes go through a
//! temp file in the same directory followed by a rename, so a crash leaves
//! either the old or the new record on disk. A record that cannot be read or
//! parsed loads as an empty cache.
//!
//! Every write is a read-modify-write through [`CacheStore::update`], which
//! the store serializes. Two cache instances over the same store (a bundle
//! reloaded while its predecessor still finishes an upload) therefore merge
//! their entries instead of overwriting each other. Record I/O runs on the
//! blocking pool when called from async paths.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use docsearch_core::config::FileCacheSettings;
use docsearch_core::context::RequestContext;
use docsearch_core::error::{Error, Result};
use docsearch_core::traits::Uploader;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Restored from the record key on load.
    #[serde(default, skip_serializing)]
    pub local_id: String,
    pub remote_handle: String,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub source_path: String,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool { now < self.expires_at }
}

pub type CacheRecord = BTreeMap<String, CacheEntry>;

/// Stable storage for one document's cache record.
pub trait CacheStore: Send + Sync {
    /// A missing record is an empty cache, not an error.
    fn load(&self) -> Result<CacheRecord>;
    fn save(&self, record: &CacheRecord) -> Result<()>;
    fn location(&self) -> PathBuf;

    /// Apply `change` to the current record and store the result, serialized
    /// with every other `update` on this store. An unreadable record is
    /// replaced. Returns the record as written.
    fn update(&self, change: &mut dyn FnMut(&mut CacheRecord)) -> Result<CacheRecord>;
}

fn load_or_empty(store: &dyn CacheStore) -> CacheRecord {
    store.load().unwrap_or_else(|e| {
        warn!(path = %store.location().display(), error = %e, "file cache record unreadable; starting empty");
        CacheRecord::new()
    })
}

/// Fold `from` into `into`, keeping whichever entry per id expires later.
fn merge_newer(into: &mut CacheRecord, from: impl IntoIterator<Item = (String, CacheEntry)>) {
    for (id, entry) in from {
        match into.get(&id) {
            Some(existing) if existing.expires_at >= entry.expires_at => {}
            _ => {
                into.insert(id, entry);
            }
        }
    }
}

fn parse_record(raw: &str, location: &Path) -> Result<CacheRecord> {
    let mut record: CacheRecord = serde_json::from_str(raw)
        .map_err(|e| Error::CacheCorrupt { path: location.to_path_buf(), reason: e.to_string() })?;
    for (key, entry) in &mut record {
        entry.local_id.clone_from(key);
    }
    Ok(record)
}

pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into(), write_lock: Mutex::new(()) } }
}

impl CacheStore for JsonFileStore {
    fn load(&self) -> Result<CacheRecord> {
        if !self.path.exists() { return Ok(CacheRecord::new()); }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::CacheCorrupt { path: self.path.clone(), reason: e.to_string() })?;
        parse_record(&raw, &self.path)
    }

    fn save(&self, record: &CacheRecord) -> Result<()> {
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, record).map_err(anyhow::Error::from)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn location(&self) -> PathBuf { self.path.clone() }

    fn update(&self, change: &mut dyn FnMut(&mut CacheRecord)) -> Result<CacheRecord> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut record = load_or_empty(self);
        change(&mut record);
        self.save(&record)?;
        Ok(record)
    }
}

/// Keeps the serialized record in memory. `with_raw` seeds arbitrary text.
#[derive(Default)]
pub struct MemoryStore {
    raw: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_raw(raw: impl Into<String>) -> Self { Self { raw: Mutex::new(Some(raw.into())) } }

    pub fn raw(&self) -> Option<String> { self.raw.lock().unwrap_or_else(PoisonError::into_inner).clone() }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<CacheRecord> {
        match self.raw() {
            Some(raw) => parse_record(&raw, &self.location()),
            None => Ok(CacheRecord::new()),
        }
    }

    fn save(&self, record: &CacheRecord) -> Result<()> {
        let raw = serde_json::to_string(record).map_err(anyhow::Error::from)?;
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw);
        Ok(())
    }

    fn location(&self) -> PathBuf { PathBuf::from("<memory>") }

    fn update(&self, change: &mut dyn FnMut(&mut CacheRecord)) -> Result<CacheRecord> {
        let mut raw = self.raw.lock().unwrap_or_else(PoisonError::into_inner);
        let mut record = raw.as_deref().and_then(|r| parse_record(r, &self.location()).ok()).unwrap_or_default();
        change(&mut record);
        *raw = Some(serde_json::to_string(&record).map_err(anyhow::Error::from)?);
        Ok(record)
    }
}

/// Result of a single lookup-or-upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fetched {
    pub remote_handle: String,
    pub cached: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UploadItem {
    pub local_id: String,
    pub source_path: PathBuf,
}

#[derive(Debug)]
pub struct ItemOutcome {
    pub local_id: String,
    pub result: Result<Fetched>,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// One entry per processed item, in request order.
    pub results: Vec<ItemOutcome>,
    pub uploaded: usize,
    pub cached: usize,
    pub failed: usize,
    pub truncated: bool,
    /// Items beyond `limit` that were not processed.
    pub remaining: usize,
}

pub struct ExternalResourceCache {
    store: Arc<dyn CacheStore>,
    ttl: chrono::Duration,
    upload_timeout: Duration,
    concurrency: usize,
    entries: Mutex<CacheRecord>,
}

impl ExternalResourceCache {
    /// Load the record from `store`, dropping entries already expired at `now`.
    /// Blocking.
    pub fn open(store: Arc<dyn CacheStore>, settings: &FileCacheSettings, now: DateTime<Utc>) -> Self {
        let mut entries = load_or_empty(store.as_ref());
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        if entries.len() != before {
            debug!(dropped = before - entries.len(), "expired file cache entries dropped");
        }
        Self {
            store,
            ttl: settings.ttl(),
            upload_timeout: settings.upload_timeout(),
            concurrency: settings.upload_concurrency.max(1),
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheRecord> { self.entries.lock().unwrap_or_else(PoisonError::into_inner) }

    pub fn ttl(&self) -> chrono::Duration { self.ttl }

    /// Live entry for `local_id`, if any. Never returns an expired handle.
    pub fn get(&self, local_id: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        self.lock().get(local_id).filter(|e| e.is_live(now)).cloned()
    }

    pub fn entries(&self, now: DateTime<Utc>) -> Vec<CacheEntry> {
        self.lock().values().filter(|e| e.is_live(now)).cloned().collect()
    }

    pub fn len(&self) -> usize { self.lock().len() }

    pub fn is_empty(&self) -> bool { self.lock().is_empty() }

    /// Drop every entry here and in the stored record. Blocking.
    pub fn clear(&self) -> Result<()> {
        self.lock().clear();
        self.store.update(&mut |record| record.clear())?;
        Ok(())
    }

    /// Merge this instance's entries into the stored record, keeping entries
    /// other instances wrote meanwhile. Blocking.
    pub fn flush(&self) -> Result<()> {
        let snapshot = self.lock().clone();
        let written = self.store.update(&mut |record| merge_newer(record, snapshot.clone()))?;
        merge_newer(&mut self.lock(), written);
        Ok(())
    }

    /// Return the live handle for `local_id` or upload `source_path` and cache
    /// the new handle until `now + ttl`. Upload failures are not cached and
    /// leave any previous entry as it was.
    pub async fn get_or_upload(
        &self,
        local_id: &str,
        source_path: &Path,
        uploader: &dyn Uploader,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> Result<Fetched> {
        if let Some(hit) = self.get(local_id, now) {
            debug!(local_id, "file cache hit");
            return Ok(Fetched { remote_handle: hit.remote_handle, cached: true, expires_at: hit.expires_at });
        }

        let upload_ctx = ctx.clone().with_timeout(self.upload_timeout);
        let upload = async {
            uploader
                .upload(source_path)
                .await
                .map_err(|e| Error::UploadFailed { local_id: local_id.to_string(), reason: format!("{e:#}") })
        };
        let remote_handle = upload_ctx.run(&format!("upload {local_id}"), upload).await?;

        let entry = CacheEntry {
            local_id: local_id.to_string(),
            remote_handle: remote_handle.clone(),
            uploaded_at: now,
            expires_at: now + self.ttl,
            source_path: source_path.to_string_lossy().into_owned(),
        };
        let expires_at = entry.expires_at;
        self.lock().insert(local_id.to_string(), entry.clone());

        let store = Arc::clone(&self.store);
        let id = local_id.to_string();
        let persisted = tokio::task::spawn_blocking(move || {
            store.update(&mut |record| {
                record.retain(|_, e| e.is_live(now));
                record.insert(id.clone(), entry.clone());
            })
        })
        .await;
        match persisted {
            Ok(Ok(written)) => merge_newer(&mut self.lock(), written),
            Ok(Err(e)) => warn!(local_id, error = %e, "file cache record not persisted"),
            Err(e) => warn!(local_id, error = %e, "file cache persist task failed"),
        }
        info!(local_id, remote_handle = %remote_handle, "file uploaded");
        Ok(Fetched { remote_handle, cached: false, expires_at })
    }

    /// Process at most `limit` items; the rest are reported through
    /// `truncated`/`remaining`. One failing item never aborts the batch.
    pub async fn batch_get_or_upload(
        &self,
        items: &[UploadItem],
        uploader: &dyn Uploader,
        now: DateTime<Utc>,
        limit: usize,
        ctx: &RequestContext,
    ) -> BatchOutcome {
        let take = items.len().min(limit);
        let results: Vec<ItemOutcome> = stream::iter(&items[..take])
            .map(|item| async move {
                let result = self.get_or_upload(&item.local_id, &item.source_path, uploader, now, ctx).await;
                ItemOutcome { local_id: item.local_id.clone(), result }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut outcome = BatchOutcome { truncated: items.len() > take, remaining: items.len() - take, ..BatchOutcome::default() };
        for r in &results {
            match &r.result {
                Ok(f) if f.cached => outcome.cached += 1,
                Ok(_) => outcome.uploaded += 1,
                Err(e) => {
                    warn!(local_id = %r.local_id, error = %e, "upload failed");
                    outcome.failed += 1;
                }
            }
        }
        outcome.results = results;
        outcome
    }
}
