//! Error types for the proxy.

use thiserror::Error;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// CA or leaf certificate error.
    #[error("CA error: {0}")]
    Ca(#[from] CaError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Request or response could not be built.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(#[from] hyper::http::Error),

    /// Listen address could not be parsed.
    #[error("invalid listen address: {0}")]
    ListenAddr(String),
}

/// Certificate authority error type.
#[derive(Debug, Error)]
pub enum CaError {
    /// Failed to generate key material or certificates.
    #[error("failed to generate CA material: {0}")]
    Generation(String),

    /// Failed to read CA files.
    #[error("failed to read CA: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse CA material.
    #[error("failed to parse CA: {0}")]
    Parse(String),

    /// Failed to persist CA files.
    #[error("failed to write CA: {0}")]
    Write(String),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
