use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use tracing::debug;

use docsearch_core::config::UploaderSettings;
use docsearch_core::traits::Uploader;

const API_VERSION: &str = "2023-06-01";

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

/// Uploads images to the Anthropic Files API and returns the file id.
pub struct AnthropicFileUploader {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    beta: String,
}

impl AnthropicFileUploader {
    pub fn new(settings: &UploaderSettings, timeout: Duration) -> anyhow::Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("uploader.api_key is not set (APP_UPLOADER__API_KEY)"))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("docsearch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/files", settings.api_base.trim_end_matches('/')),
            api_key,
            beta: settings.beta.clone(),
        })
    }

    async fn upload_file(&self, path: &Path) -> anyhow::Result<String> {
        let bytes = tokio::fs::read(path).await.with_context(|| format!("reading {}", path.display()))?;
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("image").to_string();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name).mime_str(mime_for(path))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("anthropic-beta", &self.beta)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("files API returned {status}: {body}");
        }
        let file: FileObject = response.json().await.context("decoding files API response")?;
        debug!(path = %path.display(), file_id = %file.id, "image uploaded");
        Ok(file.id)
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

impl Uploader for AnthropicFileUploader {
    fn upload<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, anyhow::Result<String>> {
        self.upload_file(path).boxed()
    }
}
