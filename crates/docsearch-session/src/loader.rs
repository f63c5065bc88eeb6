use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};

use docsearch_core::config::Settings;
use docsearch_core::error::{Error, Result};
use docsearch_core::traits::{Clock, Embedder, IndexHandle};
use docsearch_core::types::{DocumentId, IndexKind};
use docsearch_text::LexicalIndexHandle;
use docsearch_vector::{open_db, table_exists, Connection, FigureTable, VectorIndexHandle};

use crate::bundle::{BundleParts, DocumentResourceBundle, FigureSource};
use crate::chunks::ChunkStore;
use crate::file_cache::{CacheStore, ExternalResourceCache, JsonFileStore};
use crate::registry::BundleLoader;

/// Loads bundles from `<extraction_dir>/<doc_id>/`.
///
/// Only a missing document directory is an error. Each index kind whose
/// artifact is absent, or fails to open, is left empty. Every bundle loaded
/// for a document shares one cache store, so a reloaded bundle and its
/// evicted predecessor serialize their record writes.
pub struct DiskBundleLoader {
    root: PathBuf,
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    clock: Arc<dyn Clock>,
    cache_stores: Mutex<HashMap<PathBuf, Arc<JsonFileStore>>>,
}

impl DiskBundleLoader {
    pub fn new(settings: Settings, embedder: Arc<dyn Embedder>, clock: Arc<dyn Clock>) -> Self {
        Self { root: settings.data.extraction_root(), settings, embedder, clock, cache_stores: Mutex::default() }
    }

    fn cache_store(&self, path: PathBuf) -> Arc<JsonFileStore> {
        let mut stores = self.cache_stores.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(stores.entry(path.clone()).or_insert_with(|| Arc::new(JsonFileStore::new(path))))
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Directory for `doc_id`, rejecting ids that are not a single plain path component.
    pub fn document_dir(&self, doc_id: &DocumentId) -> Result<PathBuf> {
        let mut components = Path::new(doc_id.as_str()).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(doc_id.as_str())),
            _ => Err(Error::DocumentNotFound(doc_id.to_string())),
        }
    }

    async fn open_lexical(&self, doc_id: &DocumentId, base: &Path) -> Option<Arc<dyn IndexHandle>> {
        let dir = base.join(&self.settings.data.lexical_index_dir);
        let (id, base, preview) = (doc_id.to_string(), base.to_path_buf(), self.settings.search.preview_chars);
        let opened = tokio::task::spawn_blocking(move || {
            if !dir.join("meta.json").exists() { return Ok(None); }
            LexicalIndexHandle::open(&id, &dir, &base, preview).map(Some)
        })
        .await;
        match opened {
            Ok(Ok(Some(handle))) => Some(Arc::new(handle)),
            Ok(Ok(None)) => {
                warn!(doc_id = %doc_id, kind = %IndexKind::Lexical, "index artifact missing");
                None
            }
            Ok(Err(e)) => {
                warn!(doc_id = %doc_id, kind = %IndexKind::Lexical, error = %e, "index failed to open");
                None
            }
            Err(e) => {
                warn!(doc_id = %doc_id, kind = %IndexKind::Lexical, error = %e, "index open task failed");
                None
            }
        }
    }

    async fn open_vector(&self, conn: &Connection, doc_id: &DocumentId, kind: IndexKind) -> Option<Arc<dyn IndexHandle>> {
        let table = VectorIndexHandle::table_name(kind)?;
        let opened = async {
            if !table_exists(conn, table).await? { return Ok(None); }
            VectorIndexHandle::open(conn, doc_id.as_str(), kind, Arc::clone(&self.embedder)).await.map(Some)
        };
        match opened.await {
            Ok(Some(handle)) => Some(Arc::new(handle)),
            Ok(None) => {
                warn!(doc_id = %doc_id, %kind, "index artifact missing");
                None
            }
            Err(e) => {
                warn!(doc_id = %doc_id, %kind, error = %e, "index failed to open");
                None
            }
        }
    }

    async fn open_figures(conn: &Connection, doc_id: &DocumentId) -> Option<Arc<dyn FigureSource>> {
        match FigureTable::open(conn).await {
            Ok(Some(t)) => Some(Arc::new(t)),
            Ok(None) => None,
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "figure table failed to open");
                None
            }
        }
    }

    async fn load_bundle(&self, doc_id: &DocumentId) -> Result<DocumentResourceBundle> {
        let base = self.document_dir(doc_id)?;
        if !is_dir(&base).await {
            return Err(Error::DocumentNotFound(doc_id.to_string()));
        }
        let data = &self.settings.data;

        let lexical = self.open_lexical(doc_id, &base).await;
        let lance_dir = base.join(&data.lance_dir);
        let (text_vector, caption_vector, figures) = if is_dir(&lance_dir).await {
            match open_db(&lance_dir).await {
                Ok(conn) => (
                    self.open_vector(&conn, doc_id, IndexKind::TextVector).await,
                    self.open_vector(&conn, doc_id, IndexKind::CaptionVector).await,
                    Self::open_figures(&conn, doc_id).await,
                ),
                Err(e) => {
                    warn!(doc_id = %doc_id, error = %e, "vector store failed to open");
                    (None, None, None)
                }
            }
        } else {
            warn!(doc_id = %doc_id, "vector store missing");
            (None, None, None)
        };

        let store: Arc<dyn CacheStore> = self.cache_store(base.join(&data.file_cache_name));
        let (cache_settings, now) = (self.settings.file_cache.clone(), self.clock.now());
        let (id, manifest_path) = (doc_id.clone(), base.join(&data.manifest_name));
        let (file_cache, manifest) = tokio::task::spawn_blocking(move || {
            (ExternalResourceCache::open(store, &cache_settings, now), read_manifest(&id, &manifest_path))
        })
        .await
        .map_err(|e| Error::Operation(anyhow!("opening cached state for {doc_id}: {e}")))?;

        info!(
            doc_id = %doc_id,
            lexical = lexical.is_some(),
            text_vector = text_vector.is_some(),
            caption_vector = caption_vector.is_some(),
            cached_files = file_cache.len(),
            "document artifacts opened"
        );
        Ok(DocumentResourceBundle::new(BundleParts {
            doc_id: doc_id.clone(),
            chunk_store: ChunkStore::new(base.join(&data.chunk_dir)),
            metadata_table_path: lance_dir,
            base_dir: base,
            lexical,
            text_vector,
            caption_vector,
            figures,
            manifest,
            file_cache,
        }))
    }
}

/// Blocking.
fn read_manifest(doc_id: &DocumentId, path: &Path) -> Option<serde_json::Value> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(doc_id = %doc_id, path = %path.display(), error = %e, "manifest unreadable");
            None
        }
    }
}

async fn is_dir(path: &Path) -> bool { tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) }

impl BundleLoader for DiskBundleLoader {
    fn load<'a>(&'a self, doc_id: &'a DocumentId) -> BoxFuture<'a, Result<DocumentResourceBundle>> {
        self.load_bundle(doc_id).boxed()
    }
}
