use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("No video file part")]
    MissingFile,

    #[error("No selected file")]
    EmptyFilename,

    #[error("File type not allowed: {0}")]
    UnsupportedType(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Invalid video ID")]
    InvalidId,

    #[error("Path escapes the video output directory: {0}")]
    PathTraversal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job {0} has already finished")]
    AlreadyFinished(String),

    #[error("Transcode queue is full, try again later")]
    QueueFull,

    #[error("Transcode queue is shut down")]
    QueueClosed,

    #[error("Upload interrupted: {0}")]
    Upload(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl VideoError {
    /// Errors caused by the request itself rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VideoError::MissingFile
                | VideoError::EmptyFilename
                | VideoError::UnsupportedType(_)
                | VideoError::InvalidName(_)
                | VideoError::InvalidId
                | VideoError::PathTraversal(_)
                | VideoError::NotFound(_)
                | VideoError::AlreadyFinished(_)
                | VideoError::Upload(_)
        )
    }
}
