//! Error types for the core pipeline.

use thiserror::Error;

/// Protocol layer error type.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Body is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Body parsed but does not have the shape the handler expects.
    #[error("unsupported payload shape: {0}")]
    Shape(String),
}
