use storm_cache::CacheError;
use storm_orm::{EventError, ModelError};
use storm_storage::StorageError;
use thiserror::Error;

/// Attachment errors
#[derive(Error, Debug)]
pub enum FilesError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Downloading {url} failed with status {status}")]
    RemoteStatus { url: String, status: u16 },

    #[error("File not found on disk: {0}")]
    NotFound(String),

    #[error("File {path} is missing after it was written")]
    Consistency { path: String },

    #[error("File too large: {size} bytes, max allowed: {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("File {file_name} has no data to store")]
    MissingData { file_name: String },

    #[error("Invalid file: {0}")]
    Invalid(String),

    #[error("Thumbnail task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for attachment operations
pub type FilesResult<T> = Result<T, FilesError>;

impl From<FilesError> for EventError {
    fn from(err: FilesError) -> Self {
        match err {
            FilesError::Invalid(_) | FilesError::TooLarge { .. } | FilesError::MissingData { .. } => {
                EventError::validation(&err.to_string())
            }
            other => EventError::observer(&other.to_string()),
        }
    }
}
