use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const CHUNKS_TABLE: &str = "chunks";
pub const CAPTIONS_TABLE: &str = "captions";
pub const FIGURES_TABLE: &str = "figures";

fn vector_field(dim: i32) -> Field {
    Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true)
}

fn figure_fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("page_index", DataType::Int64, false),
        Field::new("image_index", DataType::Int64, false),
        Field::new("image_path", DataType::Utf8, false),
        Field::new("has_caption", DataType::Boolean, false),
        Field::new("caption", DataType::Utf8, false),
        Field::new("width", DataType::Int64, false),
        Field::new("height", DataType::Int64, false),
    ]
}

/// Text chunk embeddings: `id, chunk_order, source_path, content, vector`.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("chunk_order", DataType::Int64, false),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        vector_field(dim),
    ]))
}

/// Caption embeddings carry the figure columns next to the vector.
pub fn build_caption_schema(dim: i32) -> Arc<Schema> {
    let mut fields = figure_fields();
    fields.push(vector_field(dim));
    Arc::new(Schema::new(fields))
}

pub fn build_figure_schema() -> Arc<Schema> {
    Arc::new(Schema::new(figure_fields()))
}
