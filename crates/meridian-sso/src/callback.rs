//! Return-URL token consumption
//!
//! When the gateway finishes the provider handshake it sends the user back
//! to the application with token material in the query string. This module
//! extracts the configured parameters and produces the cleaned URL the
//! application should show, leaving every other parameter (and their
//! relative order) intact.

use url::Url;

use crate::settings::ProviderSettings;

/// Token material extracted from a federated return URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnTokens {
    pub access: String,
    pub refresh: Option<String>,
    pub idp: Option<String>,
}

/// Extract token parameters from `current`, returning the tokens and the URL
/// with exactly those parameters removed.
///
/// Returns `None` unless federated login is enabled, an access-token
/// parameter name is configured, and that parameter is present in the URL.
/// Partial material (a refresh token with no access token) is left in place.
/// Idempotent: feeding the cleaned URL back in yields `None`.
pub fn consume_return_url(
    current: &Url,
    settings: &ProviderSettings,
) -> Option<(ReturnTokens, Url)> {
    let access_param = settings.access_param()?;
    let refresh_param = settings.refresh_token_param.as_deref().filter(|p| !p.is_empty());
    let idp_param = settings.idp_token_param.as_deref().filter(|p| !p.is_empty());

    let mut access = None;
    let mut refresh = None;
    let mut idp = None;
    let mut remaining: Vec<(String, String)> = Vec::new();

    for (name, value) in current.query_pairs() {
        if name == access_param {
            access = Some(value.into_owned());
        } else if refresh_param == Some(name.as_ref()) {
            refresh = Some(value.into_owned());
        } else if idp_param == Some(name.as_ref()) {
            idp = Some(value.into_owned());
        } else {
            remaining.push((name.into_owned(), value.into_owned()));
        }
    }

    let access = access?;

    let mut cleaned = current.clone();
    cleaned.set_query(None);
    if !remaining.is_empty() {
        cleaned
            .query_pairs_mut()
            .extend_pairs(remaining.iter().map(|(name, value)| (name.as_str(), value.as_str())));
    }

    Some((ReturnTokens { access, refresh, idp }, cleaned))
}
