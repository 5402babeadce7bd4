//! Session error taxonomy
//!
//! Every variant wraps a plain message and the enum is `Clone`: a failed
//! verification cycle is delivered to every caller that attached to it, so
//! the error value itself has to be shareable.

/// Errors surfaced by session operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Construction-time or call-time configuration defect. Never swallowed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A provider login named an id with no matching configuration.
    #[error("provider configuration not found: {0}")]
    ProviderNotFound(String),

    /// The identity backend rejected or failed an operation. Propagated
    /// unchanged; this layer never retries.
    #[error("identity backend error: {0}")]
    Backend(String),

    /// An operation was called in a state it must not run in.
    #[error("invalid operation: {0}")]
    Misuse(String),

    /// Token persistence failed.
    #[error("token store error: {0}")]
    Store(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
