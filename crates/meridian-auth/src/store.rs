//! Durable token storage
//!
//! One JSON file holds the session's token material: the access token, its
//! paired refresh token, and the identity-provider token captured during a
//! federated return. The file is the source of truth across process
//! restarts; the session controller reads through this store on every
//! verification.
//!
//! All writes go through atomic temp-file + rename so a crash mid-write
//! never corrupts the stored tokens. A tokio `Mutex` serializes access.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::claims::TokenClaims;
use crate::error::{Error, Result};
use crate::identity::IdentityClient;

/// Refresh when the access token expires within this window.
const REFRESH_LEEWAY_SECS: u64 = 60;

/// The three independently managed token kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp: Option<String>,
}

impl TokenSet {
    fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none() && self.idp.is_none()
    }
}

/// Thread-safe token file manager.
pub struct TokenStore {
    path: PathBuf,
    state: Mutex<TokenSet>,
}

impl TokenStore {
    /// Load tokens from the given file path.
    ///
    /// If the file doesn't exist, creates it empty (first run, or a fresh
    /// profile directory).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let tokens = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token file: {e}")))?;
            serde_json::from_str(&contents)
                .map_err(|e| Error::Io(format!("parsing token file: {e}")))?
        } else {
            info!(path = %path.display(), "token file not found, creating empty store");
            let empty = TokenSet::default();
            write_atomic(&path, &empty).await?;
            empty
        };

        debug!(
            path = %path.display(),
            access = tokens.access.is_some(),
            refresh = tokens.refresh.is_some(),
            "token store loaded"
        );

        Ok(Self {
            path,
            state: Mutex::new(tokens),
        })
    }

    /// Current access token, if any. No validity check; see [`Self::valid_token`].
    pub async fn access_token(&self) -> Option<String> {
        self.state.lock().await.access.clone()
    }

    /// Store the access token.
    pub async fn set_access_token(&self, value: String) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access = Some(value);
        write_atomic(&self.path, &state).await
    }

    /// Remove the access token. Returns whether one was present; the file is
    /// only rewritten when something was actually removed.
    pub async fn remove_access_token(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let removed = state.access.take().is_some();
        if removed {
            write_atomic(&self.path, &state).await?;
        }
        Ok(removed)
    }

    /// Current refresh token, if any.
    pub async fn refresh_token(&self) -> Option<String> {
        self.state.lock().await.refresh.clone()
    }

    /// Store the refresh token.
    pub async fn set_refresh_token(&self, value: String) -> Result<()> {
        let mut state = self.state.lock().await;
        state.refresh = Some(value);
        write_atomic(&self.path, &state).await
    }

    /// Remove the refresh token. Returns whether one was present.
    pub async fn remove_refresh_token(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let removed = state.refresh.take().is_some();
        if removed {
            write_atomic(&self.path, &state).await?;
        }
        Ok(removed)
    }

    /// Current identity-provider token, if any.
    pub async fn idp_token(&self) -> Option<String> {
        self.state.lock().await.idp.clone()
    }

    /// Store the identity-provider token captured from a federated return.
    pub async fn set_idp_token(&self, value: String) -> Result<()> {
        let mut state = self.state.lock().await;
        state.idp = Some(value);
        write_atomic(&self.path, &state).await
    }

    /// Remove the identity-provider token. Returns whether one was present.
    pub async fn remove_idp_token(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let removed = state.idp.take().is_some();
        if removed {
            write_atomic(&self.path, &state).await?;
        }
        Ok(removed)
    }

    /// Store a grant's access token and, when present, its refresh token in
    /// one write. Fields the grant doesn't carry are left untouched.
    pub async fn store_grant(&self, access: String, refresh: Option<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access = Some(access);
        if let Some(refresh) = refresh {
            state.refresh = Some(refresh);
        }
        write_atomic(&self.path, &state).await
    }

    /// Remove all tokens in one write. Returns whether anything was removed;
    /// an already-empty store skips the write entirely.
    pub async fn clear(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.is_empty() {
            return Ok(false);
        }
        *state = TokenSet::default();
        write_atomic(&self.path, &state).await?;
        Ok(true)
    }

    /// Get a currently valid access token, refreshing through the identity
    /// client when the stored one is close to expiry.
    ///
    /// Returns `Ok(None)` when no usable token can be produced: nothing
    /// stored, or no refresh token to renew with. A rejected refresh token is
    /// dropped from the store so it is never presented twice; transient
    /// refresh failures are logged and reported as absence, and the next call
    /// tries again.
    pub async fn valid_token(
        &self,
        identity: &IdentityClient,
        client_id: &str,
    ) -> Result<Option<String>> {
        let (access, refresh) = {
            let state = self.state.lock().await;
            (state.access.clone(), state.refresh.clone())
        };

        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        if let Some(token) = access {
            match TokenClaims::parse(&token) {
                Ok(claims) => {
                    if !claims.expires_within(now_secs, REFRESH_LEEWAY_SECS) {
                        return Ok(Some(token));
                    }
                    // Inside the refresh window. A strictly unexpired token
                    // is still usable when there is nothing to renew with.
                    if refresh.is_none() && !claims.expires_within(now_secs, 0) {
                        return Ok(Some(token));
                    }
                    debug!("access token expiring, attempting refresh");
                }
                Err(e) => {
                    warn!(error = %e, "stored access token unreadable, treating as expired");
                }
            }
        }

        let Some(refresh) = refresh else {
            return Ok(None);
        };

        match identity.refresh_grant(&refresh, client_id).await {
            Ok(grant) => {
                let mut state = self.state.lock().await;
                state.access = Some(grant.access_token.clone());
                if let Some(rotated) = grant.refresh_token {
                    state.refresh = Some(rotated);
                }
                write_atomic(&self.path, &state).await?;
                info!("access token refreshed");
                Ok(Some(grant.access_token))
            }
            Err(Error::InvalidCredentials(msg)) => {
                warn!(error = %msg, "refresh token rejected, dropping it");
                let mut state = self.state.lock().await;
                state.refresh = None;
                write_atomic(&self.path, &state).await?;
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                Ok(None)
            }
        }
    }
}

/// Write the token set atomically: write to a temp file in the same
/// directory, fsync, then rename over the target. Sets 0600 permissions on
/// unix.
async fn write_atomic(path: &Path, tokens: &TokenSet) -> Result<()> {
    let json = serde_json::to_string_pretty(tokens)
        .map_err(|e| Error::Io(format!("serializing tokens: {e}")))?;

    let tmp_path = path.with_file_name(format!(
        ".{}.tmp.{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("tokens")),
        std::process::id()
    ));

    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::extract::Form;
    use axum::http::StatusCode;
    use axum::routing::post;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use tokio::net::TcpListener;

    fn jwt(usrtype: &str, exp: u64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD
            .encode(format!(r#"{{"usr":"tester","usrtype":"{usrtype}","exp":{exp}}}"#).as_bytes());
        format!("{header}.{payload}.sig")
    }

    fn future_exp() -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        now + 3600
    }

    fn near_exp() -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        now + 30
    }

    fn past_exp() -> u64 {
        1
    }

    async fn store(dir: &tempfile::TempDir) -> TokenStore {
        TokenStore::load(dir.path().join("tokens.json")).await.unwrap()
    }

    /// Stub gateway whose refresh grant either succeeds, rejects with 401, or
    /// fails with 500.
    async fn start_refresh_gateway(status: StatusCode) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let counter = hits.clone();
        tokio::spawn(async move {
            let app = Router::new().route(
                "/oauth/token",
                post(move |Form(form): Form<HashMap<String, String>>| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(
                            form.get("grant_type").map(String::as_str),
                            Some("refresh_token"),
                            "store must only ever send the refresh grant"
                        );
                        if status != StatusCode::OK {
                            return Err((status, "rejected"));
                        }
                        Ok(axum::Json(serde_json::json!({
                            "access_token": jwt("user", future_exp()),
                            "refresh_token": "rt-rotated",
                            "expires_in": 3600,
                        })))
                    }
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), hits)
    }

    fn identity(base: &str) -> IdentityClient {
        IdentityClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        {
            let store = TokenStore::load(path.clone()).await.unwrap();
            store.store_grant("at-1".into(), Some("rt-1".into())).await.unwrap();
            store.set_idp_token("idp-1".into()).await.unwrap();
        }

        let reloaded = TokenStore::load(path).await.unwrap();
        assert_eq!(reloaded.access_token().await.as_deref(), Some("at-1"));
        assert_eq!(reloaded.refresh_token().await.as_deref(), Some("rt-1"));
        assert_eq!(reloaded.idp_token().await.as_deref(), Some("idp-1"));
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        assert!(!path.exists());

        let store = TokenStore::load(path.clone()).await.unwrap();
        assert!(path.exists(), "load must create the file on first run");
        assert!(store.access_token().await.is_none());
        assert!(store.refresh_token().await.is_none());
    }

    #[tokio::test]
    async fn removes_report_presence_and_skip_rewrite_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        assert!(!store.remove_access_token().await.unwrap());
        assert!(!store.remove_refresh_token().await.unwrap());
        assert!(!store.remove_idp_token().await.unwrap());

        store.set_access_token("at".into()).await.unwrap();
        assert!(store.remove_access_token().await.unwrap());
        assert!(store.access_token().await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_everything_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store.store_grant("at".into(), Some("rt".into())).await.unwrap();
        store.set_idp_token("idp".into()).await.unwrap();

        assert!(store.clear().await.unwrap(), "first clear removes tokens");
        assert!(!store.clear().await.unwrap(), "second clear is a no-op");
        assert!(store.access_token().await.is_none());
        assert!(store.refresh_token().await.is_none());
        assert!(store.idp_token().await.is_none());
    }

    #[tokio::test]
    async fn store_grant_without_refresh_keeps_existing_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store.set_refresh_token("rt-old".into()).await.unwrap();
        store.store_grant("at-new".into(), None).await.unwrap();

        assert_eq!(store.access_token().await.as_deref(), Some("at-new"));
        assert_eq!(
            store.refresh_token().await.as_deref(),
            Some("rt-old"),
            "a grant without a refresh token must not drop the stored one"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = TokenStore::load(path.clone()).await.unwrap();
        store.set_access_token("at".into()).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = Arc::new(TokenStore::load(path.clone()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set_access_token(format!("at-{i}")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reloaded = TokenStore::load(path).await.unwrap();
        let access = reloaded.access_token().await.unwrap();
        assert!(access.starts_with("at-"), "file must hold one of the writes, got {access}");
    }

    #[tokio::test]
    async fn valid_token_returns_fresh_token_without_wire_calls() {
        let (base, hits) = start_refresh_gateway(StatusCode::OK).await;
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let token = jwt("user", future_exp());
        store.set_access_token(token.clone()).await.unwrap();

        let got = store.valid_token(&identity(&base), "storefront").await.unwrap();
        assert_eq!(got.as_deref(), Some(token.as_str()));
        assert_eq!(hits.load(Ordering::SeqCst), 0, "fresh token must not hit the gateway");
    }

    #[tokio::test]
    async fn valid_token_refreshes_near_expiry() {
        let (base, hits) = start_refresh_gateway(StatusCode::OK).await;
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store
            .store_grant(jwt("user", near_exp()), Some("rt-old".into()))
            .await
            .unwrap();

        let got = store.valid_token(&identity(&base), "storefront").await.unwrap();
        assert!(got.is_some(), "refresh should produce a token");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.refresh_token().await.as_deref(),
            Some("rt-rotated"),
            "rotated refresh token must be persisted"
        );
    }

    #[tokio::test]
    async fn valid_token_returns_none_when_nothing_usable() {
        let (base, hits) = start_refresh_gateway(StatusCode::OK).await;
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let got = store.valid_token(&identity(&base), "storefront").await.unwrap();
        assert!(got.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0, "empty store must not hit the gateway");
    }

    #[tokio::test]
    async fn valid_token_keeps_unexpired_token_when_no_refresh_exists() {
        let (base, hits) = start_refresh_gateway(StatusCode::OK).await;
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        // Inside the refresh window but not yet expired, and nothing to
        // renew with.
        let token = jwt("user", near_exp());
        store.set_access_token(token.clone()).await.unwrap();

        let got = store.valid_token(&identity(&base), "storefront").await.unwrap();
        assert_eq!(got.as_deref(), Some(token.as_str()));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_token_drops_rejected_refresh_token() {
        let (base, _hits) = start_refresh_gateway(StatusCode::UNAUTHORIZED).await;
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store
            .store_grant(jwt("user", past_exp()), Some("rt-stale".into()))
            .await
            .unwrap();

        let got = store.valid_token(&identity(&base), "storefront").await.unwrap();
        assert!(got.is_none());
        assert!(
            store.refresh_token().await.is_none(),
            "a rejected refresh token must not be presented again"
        );
    }

    #[tokio::test]
    async fn valid_token_keeps_refresh_token_on_transient_failure() {
        let (base, _hits) = start_refresh_gateway(StatusCode::INTERNAL_SERVER_ERROR).await;
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store
            .store_grant(jwt("user", past_exp()), Some("rt-keep".into()))
            .await
            .unwrap();

        let got = store.valid_token(&identity(&base), "storefront").await.unwrap();
        assert!(got.is_none());
        assert_eq!(
            store.refresh_token().await.as_deref(),
            Some("rt-keep"),
            "transient failures must not discard the refresh token"
        );
    }
}
