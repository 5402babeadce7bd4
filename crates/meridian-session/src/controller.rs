//! Session controller
//!
//! Owns the session value and every transition on it. Verification is the
//! hot path: any number of callers (mount-time checks, the outbound request
//! hook, explicit calls) may request it concurrently, and all of them must
//! observe one shared cycle. `verify` therefore runs through the
//! single-flight executor, and the resulting session is published over a
//! watch channel so consumers re-render only when a constituent value
//! actually changes.
//!
//! Login, logout, and guest-session replacement are not deduplicated;
//! callers serialize those themselves or accept last-write-wins.

use std::sync::Arc;

use meridian_auth::{IdentityClient, Password, TokenGrant, TokenStore, is_anonymous_token};
use meridian_sso::RedirectOverrides;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::cache::{NoopQueryCache, QueryCache};
use crate::error::{Error, Result};
use crate::metrics;
use crate::navigate::Navigate;
use crate::session::Session;
use crate::settings::{CurrencyDefaults, Settings};
use crate::single_flight::SingleFlight;

/// Handler consumers may register for steady-state error reporting.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Builder for [`SessionController`]. Collaborators are injected here;
/// `build` validates the settings and loads the token store.
pub struct SessionControllerBuilder {
    settings: Settings,
    navigator: Option<Arc<dyn Navigate>>,
    query_cache: Arc<dyn QueryCache>,
    default_error_handler: Option<ErrorHandler>,
}

impl SessionControllerBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            navigator: None,
            query_cache: Arc::new(NoopQueryCache),
            default_error_handler: None,
        }
    }

    /// Host navigation. Required when federated login is enabled.
    pub fn navigator(mut self, navigator: Arc<dyn Navigate>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Application query cache, flushed on login and logout.
    pub fn query_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.query_cache = cache;
        self
    }

    /// Handler consumers can reach for steady-state error reporting.
    pub fn default_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.default_error_handler = Some(handler);
        self
    }

    /// Validate settings and assemble the controller.
    pub async fn build(self) -> Result<SessionController> {
        self.settings.validate()?;

        if self.settings.provider_login_enabled().is_some() && self.navigator.is_none() {
            return Err(Error::Config(
                "federated login is enabled but no navigator was supplied".to_string(),
            ));
        }

        let identity =
            IdentityClient::new(&self.settings.base_api_url, self.settings.request_timeout())
                .map_err(|e| Error::Config(e.to_string()))?;

        let tokens = TokenStore::load(self.settings.token_file_path())
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        let (session_tx, _) = watch::channel(Session::initializing());

        info!(
            client_id = %self.settings.client_id,
            allow_anonymous = self.settings.allow_anonymous,
            federated = self.settings.provider_login_enabled().is_some(),
            "session controller ready"
        );

        Ok(SessionController {
            inner: Arc::new(ControllerInner {
                settings: self.settings,
                identity,
                tokens,
                navigator: self.navigator,
                query_cache: self.query_cache,
                default_error_handler: self.default_error_handler,
                session_tx,
                verify_flight: SingleFlight::new(),
            }),
        })
    }
}

/// The session controller. One per client application; cheap to clone, and
/// every clone shares the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    settings: Settings,
    identity: IdentityClient,
    tokens: TokenStore,
    navigator: Option<Arc<dyn Navigate>>,
    query_cache: Arc<dyn QueryCache>,
    default_error_handler: Option<ErrorHandler>,
    session_tx: watch::Sender<Session>,
    verify_flight: SingleFlight<Result<Session>>,
}

impl SessionController {
    /// Start building a controller.
    pub fn builder(settings: Settings) -> SessionControllerBuilder {
        SessionControllerBuilder::new(settings)
    }

    /// Current session snapshot.
    pub fn session(&self) -> Session {
        self.inner.session()
    }

    /// Subscribe to session changes. The receiver yields a fresh snapshot
    /// whenever any constituent value changes, and nothing otherwise.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.session_tx.subscribe()
    }

    /// Whether a verification cycle is currently in flight.
    pub async fn is_verifying(&self) -> bool {
        self.inner.verify_flight.is_running().await
    }

    pub fn base_api_url(&self) -> &str {
        &self.inner.settings.base_api_url
    }

    pub fn client_id(&self) -> &str {
        &self.inner.settings.client_id
    }

    pub fn scope(&self) -> &[String] {
        &self.inner.settings.scope
    }

    pub fn custom_scope(&self) -> &[String] {
        &self.inner.settings.custom_scope
    }

    pub fn allow_anonymous(&self) -> bool {
        self.inner.settings.allow_anonymous
    }

    /// Presentation defaults supplied at construction.
    pub fn currency(&self) -> &CurrencyDefaults {
        &self.inner.settings.currency
    }

    /// The error handler supplied at construction, if any. The controller
    /// never calls it; consumers reach for it when they have nowhere better
    /// to report a session error.
    pub fn default_error_handler(&self) -> Option<&ErrorHandler> {
        self.inner.default_error_handler.as_ref()
    }

    pub(crate) fn token_store(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Verify the session, establishing one if configuration allows.
    ///
    /// Concurrent calls share a single cycle: every overlapping caller
    /// receives the same outcome and the identity backend is consulted at
    /// most once per cycle. `provided_token` is honored by the caller that
    /// starts a cycle; a caller attaching to a running cycle gets that
    /// cycle's result and its own token is ignored.
    pub async fn verify(&self, provided_token: Option<String>) -> Result<Session> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .verify_flight
            .run(async move { inner.verify_cycle(provided_token).await })
            .await
    }

    /// Named-user login.
    ///
    /// The refresh token is stored only when `remember_me` is set and the
    /// gateway returned one. Returns the raw grant.
    pub async fn login(
        &self,
        username: &str,
        password: &Password,
        remember_me: bool,
    ) -> Result<TokenGrant> {
        self.inner.login(username, password, remember_me).await
    }

    /// Drop the session and every stored token.
    ///
    /// Idempotent: a second call finds nothing to remove and the token file
    /// is not rewritten. Logout does not re-verify; the next `verify`
    /// decides between unauthenticated and a fresh guest session.
    pub async fn logout(&self) -> Result<()> {
        self.inner.logout().await
    }

    /// Replace the current guest credential with a fresh one.
    ///
    /// Refuses to replace a named-user session; callers wanting that must
    /// log out first. An absent token passes the precondition.
    pub async fn new_anonymous_session(&self) -> Result<()> {
        self.inner.new_anonymous_session().await
    }

    /// Start federated login against the provider with the given id.
    pub fn login_with_provider(
        &self,
        provider_id: &str,
        overrides: &RedirectOverrides,
    ) -> Result<()> {
        self.inner.redirect_to_provider(provider_id, overrides)
    }
}

impl ControllerInner {
    fn session(&self) -> Session {
        self.session_tx.borrow().clone()
    }

    /// Publish a session value. Subscribers are only woken when the value
    /// actually differs.
    fn set_session(&self, next: Session) {
        self.session_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                debug!(phase = next.phase(), "session updated");
                *current = next;
                true
            }
        });
    }

    /// Lower the loading flag without touching anything else.
    fn resolve_loading(&self) {
        let mut session = self.session();
        if session.auth_loading {
            session.auth_loading = false;
            self.set_session(session);
        }
    }

    #[instrument(skip_all, fields(cycle = %format!("vfy_{}", uuid::Uuid::new_v4().as_simple())))]
    async fn verify_cycle(&self, provided_token: Option<String>) -> Result<Session> {
        self.set_session(self.session().loading());

        match self.run_verification(provided_token).await {
            Ok(session) => Ok(session),
            Err(e) => {
                // Loading must not stay raised when the cycle fails.
                self.resolve_loading();
                warn!(error = %e, "verification failed");
                metrics::record_verification("error");
                Err(e)
            }
        }
    }

    async fn run_verification(&self, provided_token: Option<String>) -> Result<Session> {
        // A federated return URL outranks every other credential source.
        if let Some(session) = self.consume_federated_return().await? {
            metrics::record_verification("provider_return");
            return Ok(session);
        }

        if let Some(token) = provided_token {
            debug!("storing caller-provided access token");
            self.tokens
                .set_access_token(token)
                .await
                .map_err(|e| Error::Store(e.to_string()))?;
            // A provided token cannot be paired with a previously stored
            // refresh token.
            self.tokens
                .remove_refresh_token()
                .await
                .map_err(|e| Error::Store(e.to_string()))?;
        }

        let valid = self
            .tokens
            .valid_token(&self.identity, &self.settings.client_id)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        if let Some(token) = valid {
            let anonymous = is_anonymous_token(&token);
            if anonymous && !self.settings.allow_anonymous {
                info!("guest token present but guest sessions are disallowed, logging out");
                self.logout().await?;
                metrics::record_verification("unauthenticated");
                return Ok(self.session());
            }
            let session = Session::authenticated(token, !anonymous);
            self.set_session(session.clone());
            metrics::record_verification(session.phase());
            return Ok(session);
        }

        if let Some(provider_login) = self.settings.provider_login_enabled() {
            if provider_login.auto_redirect {
                let first = provider_login.configs.first().ok_or_else(|| {
                    Error::Config("auto_redirect requires at least one provider config".to_string())
                })?;
                let id = first.id.clone();
                // The page is navigating away; the loading flag stays raised
                // on purpose.
                self.redirect_to_provider(&id, &RedirectOverrides::default())?;
                metrics::record_verification("redirect");
                return Ok(self.session());
            }
        }

        if !self.settings.allow_anonymous {
            debug!("no credential and guest sessions are disallowed");
            self.set_session(Session::unauthenticated());
            metrics::record_verification("unauthenticated");
            return Ok(self.session());
        }

        let grant = self
            .identity
            .anonymous_grant(
                &self.settings.client_id,
                &self.settings.scope,
                &self.settings.custom_scope,
            )
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;

        self.tokens
            .store_grant(grant.access_token.clone(), grant.refresh_token)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        let session = Session::authenticated(grant.access_token, false);
        self.set_session(session.clone());
        info!("guest session established");
        metrics::record_verification("anonymous");
        Ok(session)
    }

    /// First step of verification: when the current URL carries the
    /// gateway's return parameters, capture the tokens and scrub the URL.
    async fn consume_federated_return(&self) -> Result<Option<Session>> {
        let Some(provider_login) = self.settings.provider_login_enabled() else {
            return Ok(None);
        };
        let Some(navigator) = self.navigator.as_ref() else {
            return Ok(None);
        };

        let current = navigator.current_url();
        let Some((tokens, cleaned)) = meridian_sso::consume_return_url(&current, provider_login)
        else {
            return Ok(None);
        };

        info!("consuming federated login return");
        self.tokens
            .store_grant(tokens.access.clone(), tokens.refresh)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        if let Some(idp) = tokens.idp {
            self.tokens
                .set_idp_token(idp)
                .await
                .map_err(|e| Error::Store(e.to_string()))?;
        }

        navigator.replace_url(cleaned);

        let session = Session::authenticated(tokens.access, true);
        self.set_session(session.clone());
        Ok(Some(session))
    }

    async fn login(
        &self,
        username: &str,
        password: &Password,
        remember_me: bool,
    ) -> Result<TokenGrant> {
        self.set_session(self.session().loading());

        let grant = match self
            .identity
            .password_login(
                username,
                password,
                &self.settings.client_id,
                &self.settings.scope,
                &self.settings.custom_scope,
            )
            .await
        {
            Ok(grant) => grant,
            Err(e) => {
                self.resolve_loading();
                metrics::record_login("failure");
                return Err(Error::Backend(e.to_string()));
            }
        };

        let refresh = if remember_me {
            grant.refresh_token.clone()
        } else {
            None
        };
        if let Err(e) = self
            .tokens
            .store_grant(grant.access_token.clone(), refresh)
            .await
        {
            self.resolve_loading();
            metrics::record_login("failure");
            return Err(Error::Store(e.to_string()));
        }

        self.set_session(Session::authenticated(grant.access_token.clone(), true));
        self.query_cache.clear();
        info!(username, remember_me, "user logged in");
        metrics::record_login("success");
        Ok(grant)
    }

    async fn logout(&self) -> Result<()> {
        self.query_cache.clear();
        let removed = self
            .tokens
            .clear()
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        self.set_session(Session::unauthenticated());

        if removed {
            info!("logged out, tokens removed");
        } else {
            debug!("logout with no stored tokens");
        }
        metrics::record_logout();
        Ok(())
    }

    async fn new_anonymous_session(&self) -> Result<()> {
        let current = self
            .tokens
            .valid_token(&self.identity, &self.settings.client_id)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        if let Some(token) = current {
            if !is_anonymous_token(&token) {
                warn!("guest session requested while a named user is logged in");
                return Err(Error::Misuse(
                    "a named user is logged in; log out before requesting a guest session"
                        .to_string(),
                ));
            }
        }

        match self
            .identity
            .anonymous_grant(
                &self.settings.client_id,
                &self.settings.scope,
                &self.settings.custom_scope,
            )
            .await
        {
            Ok(grant) => {
                self.tokens
                    .store_grant(grant.access_token.clone(), grant.refresh_token)
                    .await
                    .map_err(|e| Error::Store(e.to_string()))?;
                self.set_session(Session::authenticated(grant.access_token, false));
                info!("guest session replaced");
                Ok(())
            }
            Err(e) => {
                // Demote rather than leave a stale authenticated state.
                let mut session = self.session();
                session.is_authenticated = false;
                session.is_logged_in = false;
                session.token = None;
                self.set_session(session);
                Err(Error::Backend(e.to_string()))
            }
        }
    }

    fn redirect_to_provider(&self, provider_id: &str, overrides: &RedirectOverrides) -> Result<()> {
        let Some(provider_login) = self.settings.provider_login_enabled() else {
            return Err(Error::Config(
                "federated login is not enabled for this client".to_string(),
            ));
        };
        let Some(config) = provider_login.find(provider_id) else {
            return Err(Error::ProviderNotFound(provider_id.to_string()));
        };
        let Some(navigator) = self.navigator.as_ref() else {
            return Err(Error::Config(
                "federated login requires a navigator".to_string(),
            ));
        };

        let url = meridian_sso::login_url(
            &self.settings.base_api_url,
            provider_login,
            config,
            &self.settings.client_id,
            &self.settings.scope,
            &self.settings.custom_scope,
            overrides,
        );
        let url = url::Url::parse(&url)
            .map_err(|e| Error::Config(format!("built an invalid handoff URL: {e}")))?;

        info!(provider = provider_id, "redirecting to federated login");
        metrics::record_provider_redirect(provider_id);
        navigator.redirect(url);
        Ok(())
    }
}
