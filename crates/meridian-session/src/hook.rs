//! Outbound request hook
//!
//! Callers route API requests through [`RequestAuthorizer::authorize`], which
//! verifies the session first and then attaches the bearer token. Because
//! verification is single-flight, a burst of outbound requests at app start
//! costs one cycle, not one per request.
//!
//! The process-wide slot is optional sugar for hosts that want one authorizer
//! everywhere without threading it through call sites. `ensure_installed` is
//! idempotent and first-wins.

use std::sync::OnceLock;

use crate::controller::SessionController;
use crate::error::Result;

static GLOBAL_AUTHORIZER: OnceLock<RequestAuthorizer> = OnceLock::new();

/// Attaches the current session's credential to outbound requests.
#[derive(Clone)]
pub struct RequestAuthorizer {
    controller: SessionController,
}

impl RequestAuthorizer {
    pub fn new(controller: SessionController) -> Self {
        Self { controller }
    }

    /// Install a process-wide authorizer. The first call wins; later calls
    /// return the already-installed instance and drop their argument.
    pub fn ensure_installed(controller: SessionController) -> &'static RequestAuthorizer {
        GLOBAL_AUTHORIZER.get_or_init(|| RequestAuthorizer::new(controller))
    }

    /// The process-wide authorizer, when one has been installed.
    pub fn installed() -> Option<&'static RequestAuthorizer> {
        GLOBAL_AUTHORIZER.get()
    }

    /// Verify the session and attach its bearer token to the request.
    ///
    /// An unauthenticated session (possible when guest sessions are
    /// disallowed) passes the request through untouched so the backend can
    /// issue its own challenge.
    pub async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        self.controller.verify(None).await?;
        match self.controller.session().token {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Ok(request),
        }
    }
}
