//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid partition name: {0:?}")]
    InvalidPartition(String),

    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    #[error("Invalid response snapshot: {0}")]
    InvalidResponse(String),
}
