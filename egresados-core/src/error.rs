use thiserror::Error;

use crate::capture::CaptureError;
use crate::relay::RelayError;

#[derive(Error, Debug)]
pub enum EgresadosError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate session id: {session_id}")]
    Conflict { session_id: String },

    #[error("Validation failed at step {step}: {reason}")]
    Validation { step: u8, reason: String },

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Other error: {0}")]
    Other(String),
}

impl EgresadosError {
    /// True for errors the user can recover from by correcting input and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EgresadosError::Validation { .. })
    }
}
