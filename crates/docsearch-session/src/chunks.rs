use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use docsearch_core::types::ChunkText;

/// Ordered chunk files `chunk_0001.txt`, `chunk_0002.txt`, ... in one directory.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkFetch {
    pub chunks: Vec<ChunkText>,
    /// Requested ids that did not resolve to a stored chunk.
    pub missing: Vec<String>,
}

/// Accepts `0001`, `1`, `chunk_0001` and `chunk_0001.txt`. Anything else,
/// including path components, is rejected.
pub fn parse_chunk_id(raw: &str) -> Option<u64> {
    let s = raw.trim();
    let s = s.strip_suffix(".txt").unwrap_or(s);
    let s = s.strip_prefix("chunk_").unwrap_or(s);
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) { return None; }
    s.parse().ok()
}

pub fn chunk_file_name(order: u64) -> String { format!("chunk_{order:04}.txt") }

impl ChunkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    pub fn dir(&self) -> &Path { &self.dir }

    /// Blocking.
    pub fn get_chunks(&self, ids: &[String]) -> ChunkFetch {
        let mut out = ChunkFetch::default();
        for raw in ids {
            let Some(order) = parse_chunk_id(raw) else {
                out.missing.push(raw.clone());
                continue;
            };
            let name = chunk_file_name(order);
            match std::fs::read_to_string(self.dir.join(&name)) {
                Ok(text) => out.chunks.push(ChunkText { chunk_id: name.trim_end_matches(".txt").to_string(), order, text }),
                Err(_) => out.missing.push(raw.clone()),
            }
        }
        out
    }

    /// Orders of all stored chunks, ascending. Blocking.
    pub fn list(&self) -> Vec<u64> {
        let mut orders: Vec<u64> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let name = e.file_name().to_str()?;
                if !name.starts_with("chunk_") || !name.ends_with(".txt") { return None; }
                parse_chunk_id(name)
            })
            .collect();
        orders.sort_unstable();
        orders
    }
}
