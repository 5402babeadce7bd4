//! Login handoff URL construction
//!
//! The gateway brokers the actual provider handshake. The client's only job
//! is to send the user to `{base}/ssologin` with the provider id and session
//! parameters; the gateway later returns to the application with tokens in
//! the query string (consumed by [`crate::callback`]).

use urlencoding::encode;

use crate::settings::{ProviderConfig, ProviderSettings};

/// Per-call overrides for a single handoff.
#[derive(Debug, Clone, Default)]
pub struct RedirectOverrides {
    pub client_id: Option<String>,
    pub app_start_path: Option<String>,
    pub custom_params: Option<String>,
}

/// Layered resolution: call override, then provider config, then global.
fn resolve<'a>(
    call: Option<&'a str>,
    provider: Option<&'a str>,
    global: Option<&'a str>,
) -> Option<&'a str> {
    call.or(provider).or(global)
}

/// Roles requested from the provider.
///
/// A provider's `roles` list replaces the application scope entirely.
/// Without one, application scope and custom scope are combined.
fn resolve_roles(config: &ProviderConfig, scope: &[String], custom_scope: &[String]) -> Vec<String> {
    match &config.roles {
        Some(roles) => roles.clone(),
        None => scope.iter().chain(custom_scope.iter()).cloned().collect(),
    }
}

/// Build the gateway handoff URL for one provider.
///
/// Pure string construction; every dynamic value is percent-encoded and the
/// caller performs the actual navigation.
pub fn login_url(
    base_api_url: &str,
    settings: &ProviderSettings,
    config: &ProviderConfig,
    client_id: &str,
    scope: &[String],
    custom_scope: &[String],
    overrides: &RedirectOverrides,
) -> String {
    let cid = resolve(overrides.client_id.as_deref(), config.client_id.as_deref(), None)
        .unwrap_or(client_id);

    let roles = resolve_roles(config, scope, custom_scope).join(" ");

    let mut url = format!(
        "{}/ssologin?id={}&cid={}",
        base_api_url.trim_end_matches('/'),
        encode(&config.id),
        encode(cid),
    );

    if !roles.is_empty() {
        url.push_str(&format!("&roles={}", encode(&roles)));
    }

    if let Some(path) = resolve(
        overrides.app_start_path.as_deref(),
        config.app_start_path.as_deref(),
        settings.app_start_path.as_deref(),
    ) {
        url.push_str(&format!("&appstartpath={}", encode(path)));
    }

    if let Some(params) = resolve(
        overrides.custom_params.as_deref(),
        config.custom_params.as_deref(),
        settings.custom_params.as_deref(),
    ) {
        url.push_str(&format!("&customparams={}", encode(params)));
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> ProviderSettings {
        ProviderSettings {
            enabled: true,
            access_token_param: Some("token".to_string()),
            app_start_path: Some("/home".to_string()),
            custom_params: Some("tier=global".to_string()),
            ..ProviderSettings::default()
        }
    }

    fn config(id: &str) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn url_carries_provider_and_client_id() {
        let url = login_url(
            "https://api.example.com/",
            &ProviderSettings::default(),
            &config("corp-idp"),
            "storefront",
            &[],
            &[],
            &RedirectOverrides::default(),
        );
        assert_eq!(url, "https://api.example.com/ssologin?id=corp-idp&cid=storefront");
    }

    #[test]
    fn provider_roles_replace_scope_entirely() {
        let mut config = config("p1");
        config.roles = Some(vec!["buyer".to_string()]);

        let url = login_url(
            "https://api.example.com",
            &ProviderSettings::default(),
            &config,
            "c1",
            &["admin".to_string()],
            &["reporting".to_string()],
            &RedirectOverrides::default(),
        );

        assert!(url.contains("roles=buyer"), "got: {url}");
        assert!(
            !url.contains("admin") && !url.contains("reporting"),
            "provider roles must not be merged with scope: {url}"
        );
    }

    #[test]
    fn scope_and_custom_scope_combine_when_no_provider_roles() {
        let url = login_url(
            "https://api.example.com",
            &ProviderSettings::default(),
            &config("p1"),
            "c1",
            &["shopper".to_string()],
            &["loyalty".to_string()],
            &RedirectOverrides::default(),
        );
        assert!(url.contains("roles=shopper%20loyalty"), "got: {url}");
    }

    #[test]
    fn empty_roles_are_omitted() {
        let url = login_url(
            "https://api.example.com",
            &ProviderSettings::default(),
            &config("p1"),
            "c1",
            &[],
            &[],
            &RedirectOverrides::default(),
        );
        assert!(!url.contains("roles="), "got: {url}");
    }

    #[test]
    fn layered_resolution_prefers_call_then_provider_then_global() {
        let settings = base_settings();
        let mut provider = config("p1");

        // Global only.
        let url = login_url(
            "https://api.example.com", &settings, &provider, "c1", &[], &[],
            &RedirectOverrides::default(),
        );
        assert!(url.contains("appstartpath=%2Fhome"), "got: {url}");
        assert!(url.contains("customparams=tier%3Dglobal"), "got: {url}");

        // Provider beats global.
        provider.app_start_path = Some("/provider".to_string());
        provider.client_id = Some("provider-client".to_string());
        let url = login_url(
            "https://api.example.com", &settings, &provider, "c1", &[], &[],
            &RedirectOverrides::default(),
        );
        assert!(url.contains("appstartpath=%2Fprovider"), "got: {url}");
        assert!(url.contains("cid=provider-client"), "got: {url}");

        // Call beats both.
        let overrides = RedirectOverrides {
            client_id: Some("call-client".to_string()),
            app_start_path: Some("/call".to_string()),
            custom_params: Some("a=1&b=2".to_string()),
        };
        let url = login_url(
            "https://api.example.com", &settings, &provider, "c1", &[], &[], &overrides,
        );
        assert!(url.contains("cid=call-client"), "got: {url}");
        assert!(url.contains("appstartpath=%2Fcall"), "got: {url}");
        assert!(
            url.contains("customparams=a%3D1%26b%3D2"),
            "override values must be percent-encoded: {url}"
        );
    }

    #[test]
    fn dynamic_values_are_percent_encoded() {
        let mut provider = config("corp idp");
        provider.roles = Some(vec!["buyer pro".to_string()]);

        let url = login_url(
            "https://api.example.com",
            &ProviderSettings::default(),
            &provider,
            "store front",
            &[],
            &[],
            &RedirectOverrides::default(),
        );

        assert!(url.contains("id=corp%20idp"), "got: {url}");
        assert!(url.contains("cid=store%20front"), "got: {url}");
        assert!(url.contains("roles=buyer%20pro"), "got: {url}");
    }
}
