//! docsearch-core
//!
//! Shared vocabulary of the retrieval workspace: configuration, the error
//! taxonomy, hit/record types, the capability traits implemented by the index
//! crates and the request context used to bound every blocking call.

pub mod config;
pub mod context;
pub mod error;
pub mod traits;
pub mod types;

pub use context::{CancelSignal, RequestContext};
pub use error::{Error, Result};
