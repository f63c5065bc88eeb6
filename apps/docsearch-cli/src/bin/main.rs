use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use docsearch_core::config::{Config, Settings};
use docsearch_core::context::RequestContext;
use docsearch_core::traits::{SystemClock, Uploader};
use docsearch_core::types::{DocType, DocumentId};
use docsearch_embed::load_embedder;
use docsearch_hybrid::HybridWeights;
use docsearch_session::{build_service, AnthropicFileUploader};

const USAGE: &str = "Usage: docsearch <lexical|vector|captions|hybrid|chunks|upload|status> <doc_id> [args...]
  lexical  <doc_id> <query> [--limit N] [--type chunk|image_caption]
  vector   <doc_id> <query> [--limit N]
  captions <doc_id> <query> [--limit N]
  hybrid   <doc_id> <query> [--limit N] [--weights LEXICAL,VECTOR]
  chunks   <doc_id> <chunk_id>...
  upload   <doc_id> <image_id>... [--limit N]
  status   <doc_id>
Global: --timeout-ms N";

/// Stands in when no API key is configured so read-only commands still work.
struct NoUploader;

impl Uploader for NoUploader {
    fn upload<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, anyhow::Result<String>> {
        futures::future::ready(Err(anyhow!("uploader.api_key is not set (APP_UPLOADER__API_KEY)"))).boxed()
    }
}

#[derive(Default)]
struct Args {
    positional: Vec<String>,
    limit: Option<usize>,
    doc_type: Option<DocType>,
    weights: Option<HybridWeights>,
    timeout_ms: Option<u64>,
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> anyhow::Result<&'a str> {
    args.get(i + 1).map(String::as_str).ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn parse_args(raw: &[String]) -> anyhow::Result<Args> {
    let mut out = Args::default();
    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "--limit" | "-k" => { out.limit = Some(flag_value(raw, i, "--limit")?.parse()?); i += 1; }
            "--timeout-ms" => { out.timeout_ms = Some(flag_value(raw, i, "--timeout-ms")?.parse()?); i += 1; }
            "--type" => {
                let v = flag_value(raw, i, "--type")?;
                out.doc_type = Some(DocType::parse(v).ok_or_else(|| anyhow!("unknown doc type '{v}'"))?);
                i += 1;
            }
            "--weights" => {
                let v = flag_value(raw, i, "--weights")?;
                let (l, r) = v.split_once(',').ok_or_else(|| anyhow!("--weights expects LEXICAL,VECTOR"))?;
                out.weights = Some(HybridWeights::new(l.trim().parse()?, r.trim().parse()?)?);
                i += 1;
            }
            s if s.starts_with("--") => bail!("unknown flag {s}"),
            _ => out.positional.push(raw[i].clone()),
        }
        i += 1;
    }
    Ok(out)
}

fn uploader(settings: &Settings) -> Arc<dyn Uploader> {
    match AnthropicFileUploader::new(&settings.uploader, settings.file_cache.upload_timeout()) {
        Ok(u) => Arc::new(u),
        Err(e) => {
            warn!(error = %e, "uploads disabled");
            Arc::new(NoUploader)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = env::args().skip(1).collect();
    let Some((cmd, rest)) = raw.split_first() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    let args = parse_args(rest)?;
    let Some((doc, params)) = args.positional.split_first() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    let doc_id = DocumentId::from(doc.as_str());

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let embedder = load_embedder(&settings.embedding)?;
    let service = build_service(&settings, embedder, uploader(&settings), Arc::new(SystemClock))?;

    let ctx = match args.timeout_ms {
        Some(ms) => RequestContext::background().with_timeout(Duration::from_millis(ms)),
        None => RequestContext::background(),
    };
    let limit = args.limit.unwrap_or(settings.search.default_limit);
    let query = || params.join(" ");
    let require_query = |q: &str| if q.trim().is_empty() { Err(anyhow!("{cmd} requires a query\n{USAGE}")) } else { Ok(()) };

    match cmd.as_str() {
        "lexical" => {
            let q = query(); require_query(&q)?;
            print_json(&service.search_lexical(&doc_id, &q, limit, args.doc_type, &ctx).await?)?;
        }
        "vector" => {
            let q = query(); require_query(&q)?;
            print_json(&service.search_vector(&doc_id, &q, limit, &ctx).await?)?;
        }
        "captions" => {
            let q = query(); require_query(&q)?;
            print_json(&service.search_captions(&doc_id, &q, limit, &ctx).await?)?;
        }
        "hybrid" => {
            let q = query(); require_query(&q)?;
            print_json(&service.hybrid_search(&doc_id, &q, limit, args.weights, &ctx).await?)?;
        }
        "chunks" => print_json(&service.get_chunks(&doc_id, params).await?)?,
        "upload" => {
            let report = service.upload_images(&doc_id, params, args.limit, &ctx).await?;
            let blocks = report.image_content_blocks();
            print_json(&serde_json::json!({ "report": report, "content_blocks": blocks }))?;
        }
        "status" => print_json(&service.status(&doc_id).await?)?,
        other => {
            eprintln!("Unknown command: {other}\n{USAGE}");
            std::process::exit(1);
        }
    }
    service.registry().shutdown().await;
    Ok(())
}
