//! Meridian gateway credential library
//!
//! Token material handling for clients of the Meridian commerce gateway:
//! wire grants (password, anonymous, refresh), durable token-file storage,
//! and access token claim inspection. This crate has no opinion about
//! session state; the session controller in `meridian-session` composes
//! these pieces.
//!
//! Credential flow:
//! 1. [`IdentityClient`] obtains a grant from `{base}/oauth/token`
//! 2. [`TokenStore`] persists the tokens (0600, atomic writes)
//! 3. [`TokenStore::valid_token`] silently refreshes near expiry
//! 4. [`TokenClaims`] classifies tokens (guest vs named user)

pub mod claims;
pub mod error;
pub mod identity;
pub mod password;
pub mod store;

pub use claims::{TokenClaims, is_anonymous_token};
pub use error::{Error, Result};
pub use identity::{IdentityClient, TokenGrant};
pub use password::Password;
pub use store::{TokenSet, TokenStore};
