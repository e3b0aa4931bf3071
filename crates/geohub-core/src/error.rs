use thiserror::Error;

/// Core error types for GeoHub connector handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid connector ID: {0}")]
    InvalidId(String),

    #[error("Invalid remote function: {message}")]
    InvalidRemoteFunction { message: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidId error
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId(message.into())
    }

    /// Create a new InvalidRemoteFunction error
    pub fn invalid_remote_function(message: impl Into<String>) -> Self {
        Self::InvalidRemoteFunction {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
