//! Gateway token endpoint client
//!
//! Every credential the client holds comes from one endpoint,
//! `{base}/oauth/token`, with the grant type selecting the flow:
//!
//! - `password` for named-user login
//! - `client_credentials` for anonymous (guest) sessions
//! - `refresh_token` to renew an expiring access token
//!
//! Responses share one shape regardless of grant. No retries here; callers
//! decide what a failure means for the session.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::password::Password;

/// Response from the token endpoint, shared by all grant types.
///
/// `expires_in` is a delta in seconds from response time. The access token
/// itself also carries an absolute `exp` claim, which is what the store
/// consults for validity.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Client for the gateway's token endpoint.
///
/// Wraps a connection-pooled `reqwest::Client`; cheap to clone.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    token_url: String,
}

impl IdentityClient {
    /// Build a client for the gateway at `base_api_url`.
    pub fn new(base_api_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            token_url: format!("{}/oauth/token", base_api_url.trim_end_matches('/')),
        })
    }

    /// Named-user login via the password grant.
    pub async fn password_login(
        &self,
        username: &str,
        password: &Password,
        client_id: &str,
        scope: &[String],
        custom_scope: &[String],
    ) -> Result<TokenGrant> {
        debug!(username, client_id, "requesting password grant");
        let scope = joined_scope(scope, custom_scope);
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "password"),
                ("username", username),
                ("password", password.expose()),
                ("client_id", client_id),
                ("scope", &scope),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

        read_grant(response, "login").await
    }

    /// Guest session via the client-credentials grant.
    pub async fn anonymous_grant(
        &self,
        client_id: &str,
        scope: &[String],
        custom_scope: &[String],
    ) -> Result<TokenGrant> {
        debug!(client_id, "requesting anonymous grant");
        let scope = joined_scope(scope, custom_scope);
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("scope", &scope),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("anonymous grant request failed: {e}")))?;

        read_grant(response, "anonymous grant").await
    }

    /// Renew an access token with the refresh grant.
    ///
    /// Called by the token store when the stored access token is close to
    /// expiry.
    pub async fn refresh_grant(&self, refresh_token: &str, client_id: &str) -> Result<TokenGrant> {
        debug!(client_id, "requesting refresh grant");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

        read_grant(response, "token refresh").await
    }
}

/// Application scope and custom scope travel as one space-joined field.
fn joined_scope(scope: &[String], custom_scope: &[String]) -> String {
    scope
        .iter()
        .chain(custom_scope.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read a token response, triaging status codes.
///
/// 401/403 means the presented credentials (password or refresh token) were
/// rejected; everything else non-2xx is an endpoint error.
async fn read_grant(response: reqwest::Response, operation: &str) -> Result<TokenGrant> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "{operation} rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenEndpoint(format!(
            "{operation} returned {status}: {body}"
        )));
    }

    response
        .json::<TokenGrant>()
        .await
        .map_err(|e| Error::TokenEndpoint(format!("invalid {operation} response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::Router;
    use axum::extract::Form;
    use axum::http::StatusCode;
    use axum::routing::post;
    use tokio::net::TcpListener;

    /// Token endpoint stub that echoes the received form fields back inside
    /// the issued token so assertions can see what went over the wire.
    async fn start_echo_gateway() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let app = Router::new().route(
                "/oauth/token",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    let grant_type = form.get("grant_type").cloned().unwrap_or_default();
                    let scope = form.get("scope").cloned().unwrap_or_default();
                    let username = form.get("username").cloned().unwrap_or_default();
                    axum::Json(serde_json::json!({
                        "access_token": format!("at|{grant_type}|{username}|{scope}"),
                        "refresh_token": format!("rt|{grant_type}"),
                        "expires_in": 3600,
                    }))
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }

    async fn start_failing_gateway(status: StatusCode) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let app = Router::new().route(
                "/oauth/token",
                post(move || async move { (status, "no dice") }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }

    fn client(base: &str) -> IdentityClient {
        IdentityClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn token_grant_tolerates_missing_optional_fields() {
        let grant: TokenGrant = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(grant.access_token, "abc");
        assert!(grant.refresh_token.is_none());
        assert!(grant.expires_in.is_none());
    }

    #[tokio::test]
    async fn password_login_sends_credentials_and_joined_scope() {
        let base = start_echo_gateway().await;
        let password = Password::new("hunter2");
        let grant = client(&base)
            .password_login(
                "ada",
                &password,
                "storefront",
                &["shopper".to_string()],
                &["loyalty".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(
            grant.access_token, "at|password|ada|shopper loyalty",
            "scope and custom scope must arrive as one space-joined field"
        );
        assert_eq!(grant.refresh_token.as_deref(), Some("rt|password"));
    }

    #[tokio::test]
    async fn anonymous_grant_uses_client_credentials() {
        let base = start_echo_gateway().await;
        let grant = client(&base)
            .anonymous_grant("storefront", &["shopper".to_string()], &[])
            .await
            .unwrap();

        assert_eq!(grant.access_token, "at|client_credentials||shopper");
    }

    #[tokio::test]
    async fn refresh_grant_round_trips() {
        let base = start_echo_gateway().await;
        let grant = client(&base)
            .refresh_grant("old-refresh", "storefront")
            .await
            .unwrap();

        assert_eq!(grant.access_token, "at|refresh_token||");
        assert_eq!(grant.refresh_token.as_deref(), Some("rt|refresh_token"));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_invalid_credentials() {
        let base = start_failing_gateway(StatusCode::UNAUTHORIZED).await;
        let err = client(&base)
            .refresh_grant("stale", "storefront")
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::InvalidCredentials(_)),
            "401 must map to InvalidCredentials, got {err:?}"
        );
    }

    #[tokio::test]
    async fn server_errors_map_to_token_endpoint() {
        let base = start_failing_gateway(StatusCode::INTERNAL_SERVER_ERROR).await;
        let password = Password::new("pw");
        let err = client(&base)
            .password_login("ada", &password, "storefront", &[], &[])
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::TokenEndpoint(_)),
            "500 must map to TokenEndpoint, got {err:?}"
        );
        assert!(err.to_string().contains("500"), "status should be visible: {err}");
    }
}
