//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys split on `__`). Every setting has a default so a bare checkout
//! runs without any file. Provides helpers to expand `~` and `${VAR}` and to
//! resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub registry: RegistrySettings,
    pub hybrid: HybridSettings,
    pub file_cache: FileCacheSettings,
    pub search: SearchSettings,
    pub embedding: EmbeddingSettings,
    pub uploader: UploaderSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.registry.capacity == 0 {
            return Err(Error::InvalidConfig("registry.capacity must be at least 1".into()));
        }
        if self.hybrid.overfetch_factor == 0 {
            return Err(Error::InvalidConfig("hybrid.overfetch_factor must be at least 1".into()));
        }
        let (lw, vw) = (self.hybrid.lexical_weight, self.hybrid.vector_weight);
        if !(lw >= 0.0 && vw >= 0.0) || lw + vw <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "hybrid weights must be non-negative and not both zero (lexical={lw}, vector={vw})"
            )));
        }
        if self.file_cache.batch_limit == 0 {
            return Err(Error::InvalidConfig("file_cache.batch_limit must be at least 1".into()));
        }
        if self.file_cache.upload_concurrency == 0 {
            return Err(Error::InvalidConfig("file_cache.upload_concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

/// On-disk layout of one document's artifacts under `extraction_dir/<doc_id>/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub extraction_dir: String,
    pub lexical_index_dir: String,
    pub lance_dir: String,
    pub chunk_dir: String,
    pub file_cache_name: String,
    pub manifest_name: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            extraction_dir: "extraction".into(),
            lexical_index_dir: "lexical_index".into(),
            lance_dir: "lance".into(),
            chunk_dir: "text_chunks".into(),
            file_cache_name: "file_cache.json".into(),
            manifest_name: "manifest.json".into(),
        }
    }
}

impl DataSettings {
    pub fn extraction_root(&self) -> PathBuf { expand_path(&self.extraction_dir) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub capacity: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self { Self { capacity: 4 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSettings {
    pub lexical_weight: f32,
    pub vector_weight: f32,
    pub overfetch_factor: usize,
    pub leg_timeout_ms: u64,
}

impl Default for HybridSettings {
    fn default() -> Self {
        Self { lexical_weight: 0.4, vector_weight: 0.6, overfetch_factor: 3, leg_timeout_ms: 10_000 }
    }
}

impl HybridSettings {
    pub fn leg_timeout(&self) -> Duration { Duration::from_millis(self.leg_timeout_ms) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCacheSettings {
    pub ttl_hours: i64,
    pub batch_limit: usize,
    pub upload_timeout_ms: u64,
    pub upload_concurrency: usize,
}

impl Default for FileCacheSettings {
    fn default() -> Self {
        Self { ttl_hours: 12, batch_limit: 20, upload_timeout_ms: 60_000, upload_concurrency: 4 }
    }
}

impl FileCacheSettings {
    pub fn ttl(&self) -> chrono::Duration { chrono::Duration::hours(self.ttl_hours) }
    pub fn upload_timeout(&self) -> Duration { Duration::from_millis(self.upload_timeout_ms) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_limit: usize,
    pub preview_chars: usize,
}

impl Default for SearchSettings {
    fn default() -> Self { Self { default_limit: 10, preview_chars: 160 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub dim: usize,
    pub model_dir: Option<String>,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self { Self { dim: 1024, model_dir: None, use_fake: false } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub beta: String,
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com".into(),
            api_key: None,
            beta: "files-api-2025-04-14".into(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
