//! The BM25 full-text index over the tool catalogue.
//! `ToolIndex` owns one Tantivy index. Writers call [`ToolIndex::apply_diff`]
//! per server, serialized by the caller's upstream actor; readers call [`ToolIndex::search`] against a lock-free snapshot that
//! may lag the most recent write by at most one `apply_diff`.

pub mod document;
pub mod error;
pub mod index;

pub use document::{qualified_names_in, DiffOutcome};
pub use error::IndexError;
pub use index::{SearchHit, ToolIndex};
