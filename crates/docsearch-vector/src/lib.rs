//! docsearch-vector
//!
//! LanceDB storage for a document's embeddings. Each document keeps one lance
//! database with a `chunks` table (text embeddings), a `captions` table
//! (caption embeddings plus figure columns) and a `figures` table (metadata
//! for every extracted image).

pub mod figures;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use figures::FigureTable;
pub use search::VectorIndexHandle;
pub use table::{open_db, table_exists};
pub use writer::{ChunkRow, VectorTableWriter};
pub use lancedb::Connection;
