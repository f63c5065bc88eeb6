//! docsearch-session
//!
//! Lifecycle of per-document retrieval resources: the bounded
//! [`SessionRegistry`], the [`DocumentResourceBundle`] it owns, the TTL
//! [`ExternalResourceCache`] of uploaded image handles, and the
//! [`DocumentService`] operations callers use.

pub mod bundle;
pub mod chunks;
pub mod file_cache;
pub mod loader;
pub mod registry;
pub mod service;
pub mod uploader;

use std::sync::Arc;

use docsearch_core::config::Settings;
use docsearch_core::error::Result;
use docsearch_core::traits::{Clock, Embedder, Uploader};
use docsearch_hybrid::{HybridConfig, HybridRetrievalEngine};

pub use bundle::{BundleParts, DocumentResourceBundle, FigureSource};
pub use chunks::{ChunkFetch, ChunkStore};
pub use file_cache::{BatchOutcome, CacheEntry, CacheStore, ExternalResourceCache, Fetched, JsonFileStore, MemoryStore, UploadItem};
pub use loader::DiskBundleLoader;
pub use registry::{BundleLoader, SessionRegistry};
pub use service::{DocumentService, DocumentStatus, UploadReport, UploadedImage};
pub use uploader::AnthropicFileUploader;

/// Wire a disk-backed registry and service from settings.
pub fn build_service(
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
    uploader: Arc<dyn Uploader>,
    clock: Arc<dyn Clock>,
) -> Result<DocumentService> {
    settings.validate()?;
    let loader = Arc::new(DiskBundleLoader::new(settings.clone(), embedder, Arc::clone(&clock)));
    let registry = Arc::new(SessionRegistry::new(settings.registry.capacity, loader, Arc::clone(&clock))?);
    let engine = HybridRetrievalEngine::new(HybridConfig::from(&settings.hybrid));
    Ok(DocumentService::new(registry, engine, uploader, clock, settings.file_cache.batch_limit))
}
