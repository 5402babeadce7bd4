//! Construction-time configuration
//!
//! Everything the controller needs is supplied up front and never changes:
//! gateway endpoint, client identity, requested scopes, the guest-session
//! policy, the federated-login block, and presentation defaults. Loadable
//! from a TOML file or built in code.

use std::path::{Path, PathBuf};
use std::time::Duration;

use meridian_sso::ProviderSettings;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Root configuration for a session controller.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Gateway endpoint; scheme required
    pub base_api_url: String,
    /// Public client id registered with the gateway
    pub client_id: String,
    /// Roles requested for named-user and guest sessions
    #[serde(default)]
    pub scope: Vec<String>,
    /// Application-defined roles requested alongside `scope`
    #[serde(default)]
    pub custom_scope: Vec<String>,
    /// Issue guest credentials when nobody is logged in
    #[serde(default = "default_allow_anonymous")]
    pub allow_anonymous: bool,
    /// Federated-login block; absent disables the whole path
    #[serde(default)]
    pub provider_login: Option<ProviderSettings>,
    /// Presentation defaults exposed to consumers
    #[serde(default)]
    pub currency: CurrencyDefaults,
    /// Token file location; defaults to `{client_id}.tokens.json`
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// Timeout for gateway token-endpoint calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Currency and locale defaults for price rendering.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrencyDefaults {
    #[serde(default = "default_currency_code")]
    pub currency_code: String,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for CurrencyDefaults {
    fn default() -> Self {
        Self {
            currency_code: default_currency_code(),
            language: default_language(),
        }
    }
}

fn default_allow_anonymous() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_currency_code() -> String {
    "USD".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Settings {
    /// Load settings from a TOML file and validate them.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading settings file {}: {e}", path.display())))?;

        let settings: Settings = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("parsing settings file {}: {e}", path.display())))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the invariants the controller relies on.
    pub fn validate(&self) -> Result<()> {
        if !self.base_api_url.starts_with("http://") && !self.base_api_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "base_api_url must start with http:// or https://, got: {}",
                self.base_api_url
            )));
        }

        if self.client_id.is_empty() {
            return Err(Error::Config("client_id must not be empty".to_string()));
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(provider_login) = &self.provider_login {
            if let Err(meridian_sso::Error::Config(msg)) = provider_login.validate() {
                return Err(Error::Config(msg));
            }
        }

        Ok(())
    }

    /// The federated-login block, when present and enabled.
    pub fn provider_login_enabled(&self) -> Option<&ProviderSettings> {
        self.provider_login.as_ref().filter(|p| p.enabled)
    }

    /// Resolved token file path.
    pub fn token_file_path(&self) -> PathBuf {
        self.token_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.tokens.json", self.client_id)))
    }

    /// Timeout for gateway calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
