//! Error types for detlink
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in detlink
#[derive(Debug, Error)]
pub enum DetlinkError {
    /// Connect attempt failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Read or write failure on an established connection
    #[error("Stream error: {0}")]
    Stream(String),

    /// Message text could not be decoded into detections
    #[error("Decode error: {0}")]
    Decode(String),

    /// Malformed configuration input such as an address string
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for detlink operations
pub type Result<T> = std::result::Result<T, DetlinkError>;
