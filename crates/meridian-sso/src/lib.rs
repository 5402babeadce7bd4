//! Federated login for the Meridian gateway
//!
//! The gateway brokers redirect-based login against external identity
//! providers; this crate owns the pieces of that handshake the client sees:
//!
//! - [`ProviderSettings`] / [`ProviderConfig`]: which providers exist and
//!   which return parameters carry tokens
//! - [`login_url`]: the handoff URL the user is sent to
//! - [`consume_return_url`]: extracting tokens from the URL the gateway
//!   returns the user on, and scrubbing them from it
//!
//! No provider protocol internals live here; the gateway performs the
//! actual token exchange.

pub mod callback;
pub mod error;
pub mod redirect;
pub mod settings;

pub use callback::{ReturnTokens, consume_return_url};
pub use error::{Error, Result};
pub use redirect::{RedirectOverrides, login_url};
pub use settings::{ProviderConfig, ProviderSettings};
