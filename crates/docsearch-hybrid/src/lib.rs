//! docsearch-hybrid
//!
//! Fans a query out to a document's lexical and text-vector handles, min-max
//! normalises each list and merges them by weighted consensus.

pub mod engine;
pub mod merge;

pub use engine::{HybridConfig, HybridOutcome, HybridRetrievalEngine, LegError};
pub use merge::{merge_ranked, normalize, single_source, HybridWeights};
