//! Error types for federated-login configuration

/// Errors from federated-login configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for federated-login operations.
pub type Result<T> = std::result::Result<T, Error>;
