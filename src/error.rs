use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("No admin access")]
    PermissionDenied,
    #[error("dism reported an error: {0}")]
    Tool(String),
    #[error("Invalid timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },
    #[error("Custom property path {path:?} collides with an existing entry")]
    PropertyConflict { path: String },
    #[error("{0}")]
    Message(String),
}
