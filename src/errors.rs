use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("SNAPSHOT_CORRUPT: {0}")]
    SnapshotCorrupt(String),
    #[error("TRANSACTION_FAILURE: {0}")]
    Transaction(String),
    #[error("VALIDATION_FAILURE: {0}")]
    Validation(String),
    #[error("INVALID_TRANSITION: {0}")]
    InvalidTransition(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::SnapshotCorrupt(_) => "SNAPSHOT_CORRUPT",
            Self::Transaction(_) => "TRANSACTION_FAILURE",
            Self::Validation(_) => "VALIDATION_FAILURE",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::Io(_) => "IO_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Prefixes the message with the failing operation and root entity so the
    /// caller can log and surface it without extra bookkeeping.
    pub fn in_operation(self, operation: &str, entity_id: &str) -> Self {
        let wrap = |message: String| format!("{}({}): {}", operation, entity_id, message);
        match self {
            Self::NotFound(message) => Self::NotFound(wrap(message)),
            Self::SnapshotCorrupt(message) => Self::SnapshotCorrupt(wrap(message)),
            Self::Transaction(message) => Self::Transaction(wrap(message)),
            Self::Validation(message) => Self::Validation(wrap(message)),
            Self::InvalidTransition(message) => Self::InvalidTransition(wrap(message)),
            Self::Io(message) => Self::Io(wrap(message)),
            Self::Internal(message) => Self::Internal(wrap(message)),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Transaction(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Validation(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
