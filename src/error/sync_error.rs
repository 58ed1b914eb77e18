use std::fmt;

#[derive(Debug)]
pub enum SyncError {
    // Persistence errors
    Database(sqlx::Error),

    // Resource errors
    NotFound(String),

    // Validation errors
    Validation(String),

    // Transport errors
    TransientNetwork(String),
    ChannelClosed(String),

    // Serialization errors
    Serialization(serde_json::Error),

    // Internal errors
    Internal(String),
}

impl SyncError {
    /// True for failures the user may recover from by re-issuing the action
    /// manually. Never triggers an automatic retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::TransientNetwork(_))
    }

    /// Stable machine-readable code for logs and client surfacing.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Database(_) => "DATABASE_ERROR",
            SyncError::NotFound(_) => "NOT_FOUND",
            SyncError::Validation(_) => "VALIDATION_ERROR",
            SyncError::TransientNetwork(_) => "TRANSIENT_NETWORK",
            SyncError::ChannelClosed(_) => "CHANNEL_CLOSED",
            SyncError::Serialization(_) => "SERIALIZATION_ERROR",
            SyncError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Database(e) => write!(f, "Database error: {}", e),
            SyncError::NotFound(msg) => write!(f, "Not found: {}", msg),
            SyncError::Validation(msg) => write!(f, "Validation error: {}", msg),
            SyncError::TransientNetwork(msg) => write!(f, "Transient network error: {}", msg),
            SyncError::ChannelClosed(msg) => write!(f, "Channel closed: {}", msg),
            SyncError::Serialization(e) => write!(f, "Serialization error: {}", e),
            SyncError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

// From implementations for automatic conversion
impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => SyncError::NotFound("Data not found".to_string()),
            _ => SyncError::Database(err),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err)
    }
}

// Result type alias
pub type SyncResult<T> = Result<T, SyncError>;
