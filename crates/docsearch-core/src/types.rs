//! Domain types shared by the index handles, the hybrid engine and the
//! session layer.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ItemId = String;

/// Stable identifier of one ingested document. Maps 1:1 to the document's
/// artifact directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self { Self(s) }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str { &self.0 }
}

/// The three index kinds a document may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexKind {
    Lexical,
    TextVector,
    CaptionVector,
}

impl IndexKind {
    pub fn source(self) -> HitSource {
        match self {
            IndexKind::Lexical => HitSource::Lexical,
            IndexKind::TextVector | IndexKind::CaptionVector => HitSource::Vector,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndexKind::Lexical => "lexical",
            IndexKind::TextVector => "text-vector",
            IndexKind::CaptionVector => "caption-vector",
        })
    }
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    Lexical,
    Vector,
}

/// Document types stored in the lexical index `type` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Chunk,
    ImageCaption,
}

impl DocType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocType::Chunk => "chunk",
            DocType::ImageCaption => "image_caption",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chunk" => Some(DocType::Chunk),
            "image_caption" => Some(DocType::ImageCaption),
            _ => None,
        }
    }
}

/// One row of the figure-metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureRecord {
    pub id: String,
    pub page_index: i64,
    pub image_index: i64,
    pub image_path: String,
    pub has_caption: bool,
    pub caption: String,
    pub width: i64,
    pub height: i64,
}

/// Fixed attribute set per hit kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HitAttributes {
    /// A text chunk or lexical caption entry.
    Text {
        doc_type: DocType,
        order: Option<u64>,
        page_index: Option<u64>,
        path: Option<String>,
    },
    /// A figure found through its caption embedding.
    Figure(FigureRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitPayload {
    /// Preview text (chunk excerpt or caption).
    pub content: String,
    pub attributes: HitAttributes,
}

/// A single ranked hit from one index.
///
/// `score` is on the producing index's own scale; higher is always better
/// but scores from different sources are not comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredHit {
    pub item_id: ItemId,
    pub score: f32,
    pub source: HitSource,
    pub payload: HitPayload,
}

/// Per-source contribution to a merged hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegScore {
    pub raw: f32,
    pub normalized: f32,
    /// Zero-based position in that source's ranked list.
    pub rank: usize,
}

/// A hybrid search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedHit {
    pub item_id: ItemId,
    pub score: f32,
    pub lexical: Option<LegScore>,
    pub vector: Option<LegScore>,
    pub payload: HitPayload,
}

impl MergedHit {
    pub fn in_both(&self) -> bool { self.lexical.is_some() && self.vector.is_some() }

    pub fn sources(&self) -> Vec<HitSource> {
        let mut out = Vec::with_capacity(2);
        if self.lexical.is_some() { out.push(HitSource::Lexical); }
        if self.vector.is_some() { out.push(HitSource::Vector); }
        out
    }
}

/// Full text of one stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkText {
    pub chunk_id: String,
    pub order: u64,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_type_round_trips_through_its_field_value() {
        for t in [DocType::Chunk, DocType::ImageCaption] {
            assert_eq!(DocType::parse(t.as_str()), Some(t));
        }
        assert_eq!(DocType::parse("table"), None);
    }

    #[test]
    fn hit_attributes_serialize_with_kind_tag() {
        let attrs = HitAttributes::Text { doc_type: DocType::Chunk, order: Some(3), page_index: None, path: None };
        let v = serde_json::to_value(&attrs).unwrap();
        assert_eq!(v["kind"], "text");
        assert_eq!(v["doc_type"], "chunk");
    }
}
