//! Error types for credential operations

/// Errors from credential acquisition and storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token endpoint error: {0}")]
    TokenEndpoint(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("token parse error: {0}")]
    TokenParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
