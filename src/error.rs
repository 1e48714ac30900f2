use thiserror::Error;

/// Coarse classification of a download failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Parse,
    Storage,
    StoreCorruption,
    Internal,
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No provider for source: {0}")]
    NoProvider(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Story not found: {0}")]
    StoryNotFound(String),

    #[error("Job store corrupted: {0}")]
    StoreCorruption(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Network(_) => ErrorKind::Network,
            DownloadError::Parse(_) | DownloadError::NoProvider(_) => ErrorKind::Parse,
            DownloadError::Storage(_)
            | DownloadError::StoryNotFound(_)
            | DownloadError::Io(_)
            | DownloadError::Json(_) => ErrorKind::Storage,
            DownloadError::StoreCorruption(_) => ErrorKind::StoreCorruption,
            DownloadError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
