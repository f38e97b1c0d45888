// Local filesystem storage for payloads, labels and project images
mod local;

use thiserror::Error;

pub use local::LocalStorage;

// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Io Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Destination already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage task failed: {0}")]
    Task(String),
}
