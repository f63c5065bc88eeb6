//! docsearch-text
//!
//! Tantivy-backed lexical index: the on-disk schema shared with the
//! extraction pipeline, a writer for producing index artifacts, and the
//! read-only `LexicalIndexHandle` the session layer searches through.

pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::{LexicalEntry, LexicalIndexWriter};
pub use search::LexicalIndexHandle;
