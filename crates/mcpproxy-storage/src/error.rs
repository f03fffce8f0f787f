use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database locked or unreadable: {0}")]
    Corrupt(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Corruption {.. } => StorageError::Corrupt(err.to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}
