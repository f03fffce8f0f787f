//! Index-layer error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("query parse error: {0}")]
    QueryParse(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
