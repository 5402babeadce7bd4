//! Federated-login configuration
//!
//! One gateway can broker login against several external identity providers.
//! [`ProviderSettings`] is the global block: the master switch, the return
//! parameter names, auto-redirect, and shared defaults. Each
//! [`ProviderConfig`] describes one provider the gateway knows by id. Both
//! are immutable once the session controller is built, so every invariant is
//! checked once in [`ProviderSettings::validate`].

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Global federated-login settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    /// Master switch; when false the whole federated path is skipped
    #[serde(default)]
    pub enabled: bool,
    /// Known providers, in priority order (auto-redirect uses the first)
    #[serde(default)]
    pub configs: Vec<ProviderConfig>,
    /// Redirect to the first provider when verification finds no credential
    #[serde(default)]
    pub auto_redirect: bool,
    /// Query parameter carrying the access token on return from the gateway.
    /// Required when `enabled`.
    #[serde(default)]
    pub access_token_param: Option<String>,
    /// Query parameter carrying the refresh token on return
    #[serde(default)]
    pub refresh_token_param: Option<String>,
    /// Query parameter carrying the identity provider's own token on return
    #[serde(default)]
    pub idp_token_param: Option<String>,
    /// Default path the application starts on after login
    #[serde(default)]
    pub app_start_path: Option<String>,
    /// Default extra parameters forwarded to the provider
    #[serde(default)]
    pub custom_params: Option<String>,
}

/// One external identity provider known to the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// Unique id, matched by provider login calls
    pub id: String,
    /// Roles requested for sessions from this provider. When set, this list
    /// replaces the application scope entirely; the two are never merged.
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    /// Client id override for this provider
    #[serde(default)]
    pub client_id: Option<String>,
    /// Per-provider post-login path
    #[serde(default)]
    pub app_start_path: Option<String>,
    /// Per-provider extra parameters
    #[serde(default)]
    pub custom_params: Option<String>,
}

impl ProviderSettings {
    /// Validate the invariants the redirect and return paths rely on.
    /// Called once at controller construction; failures there are fatal.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.configs.is_empty() {
            return Err(Error::Config(
                "federated login is enabled but no provider configs were given".to_string(),
            ));
        }

        if self.access_param().is_none() {
            return Err(Error::Config(
                "federated login is enabled but access_token_param is not set".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for config in &self.configs {
            if config.id.is_empty() {
                return Err(Error::Config("provider config has an empty id".to_string()));
            }
            if !seen.insert(config.id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate provider config id: {}",
                    config.id
                )));
            }
        }

        Ok(())
    }

    /// Look up a provider config by id.
    pub fn find(&self, id: &str) -> Option<&ProviderConfig> {
        self.configs.iter().find(|config| config.id == id)
    }

    /// The access-token parameter name, when enabled and non-empty.
    pub fn access_param(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.access_token_param.as_deref().filter(|name| !name.is_empty())
    }
}
