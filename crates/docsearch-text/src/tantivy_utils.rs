use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const CONTENT_TOKENIZER: &str = "text_with_stopwords";

/// Stored: `id, pdf, type, order, page_index, path`. Analyzed, unstored: `content`.
pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field("id", STRING | STORED);
    schema_builder.add_text_field("pdf", STRING | STORED);
    schema_builder.add_text_field("type", STRING | STORED);
    schema_builder.add_u64_field("order", INDEXED | STORED);
    schema_builder.add_u64_field("page_index", INDEXED | STORED);
    schema_builder.add_text_field("path", STORED);
    let content_indexing = TextFieldIndexing::default().set_tokenizer(CONTENT_TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
    schema_builder.add_text_field("content", TextOptions::default().set_indexing_options(content_indexing));
    schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
    let stop_words = [
        "a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
    ];
    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(stop_words.iter().map(|s| s.to_string())))
        .build();
    index.tokenizers().register(CONTENT_TOKENIZER, tokenizer);
}

/// Field handles resolved once per opened index.
#[derive(Debug, Clone, Copy)]
pub struct LexicalFields {
    pub id: Field,
    pub pdf: Field,
    pub doc_type: Field,
    pub order: Field,
    pub page_index: Field,
    pub path: Field,
    pub content: Field,
}

impl LexicalFields {
    pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
        Ok(Self {
            id: schema.get_field("id")?,
            pdf: schema.get_field("pdf")?,
            doc_type: schema.get_field("type")?,
            order: schema.get_field("order")?,
            page_index: schema.get_field("page_index")?,
            path: schema.get_field("path")?,
            content: schema.get_field("content")?,
        })
    }
}
