//! Client session management for Meridian storefronts.
//!
//! One controller owns the session and every transition on it: startup
//! verification, password login, federated provider handoff, guest
//! sessions, and logout. Wiring is four steps:
//!
//! 1. Load [`Settings`] from a TOML file or assemble them in code.
//! 2. Build a [`SessionController`], handing it the host's [`Navigate`]
//!    implementation when federated login is enabled. The controller is
//!    cheap to clone and every clone shares the same session.
//! 3. Install a [`RequestAuthorizer`] and route outbound API calls through
//!    it; each call verifies the session first and carries the bearer token.
//! 4. Subscribe via [`SessionController::subscribe`] and re-render on
//!    session changes. Subscribers are only woken when a constituent value
//!    actually changes.

pub mod cache;
pub mod controller;
pub mod error;
pub mod hook;
pub(crate) mod metrics;
pub mod navigate;
pub mod session;
pub mod settings;
pub mod single_flight;

pub use cache::{NoopQueryCache, QueryCache};
pub use controller::{ErrorHandler, SessionController, SessionControllerBuilder};
pub use error::{Error, Result};
pub use hook::RequestAuthorizer;
pub use meridian_auth::{Password, TokenGrant};
pub use meridian_sso::{ProviderConfig, ProviderSettings, RedirectOverrides};
pub use navigate::{Navigate, RecordedNavigation};
pub use session::Session;
pub use settings::{CurrencyDefaults, Settings};
pub use single_flight::SingleFlight;
