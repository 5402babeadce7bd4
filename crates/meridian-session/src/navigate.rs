//! Navigation seam
//!
//! The controller never talks to a browser or webview directly; the host
//! application supplies whatever navigation it actually has. Methods are
//! synchronous: implementations record or dispatch, they don't block on
//! page loads.

use std::sync::{Mutex, PoisonError};

use url::Url;

/// Host-application navigation, used by the federated login paths.
pub trait Navigate: Send + Sync {
    /// The URL the application is currently showing.
    fn current_url(&self) -> Url;

    /// Leave the application for `url` (the login handoff).
    fn redirect(&self, url: Url);

    /// Rewrite the visible URL in place, without a history entry or reload.
    fn replace_url(&self, url: Url);
}

/// In-memory navigation for hosts without a real URL bar: native apps,
/// tests, the demo binary. Redirects are recorded rather than performed;
/// the host pops them with [`RecordedNavigation::take_redirect`] and opens
/// a browser itself.
pub struct RecordedNavigation {
    current: Mutex<Url>,
    redirect_target: Mutex<Option<Url>>,
}

impl RecordedNavigation {
    pub fn new(start: Url) -> Self {
        Self {
            current: Mutex::new(start),
            redirect_target: Mutex::new(None),
        }
    }

    /// The most recent redirect request, if any. Pops the value.
    pub fn take_redirect(&self) -> Option<Url> {
        self.redirect_target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Navigate for RecordedNavigation {
    fn current_url(&self) -> Url {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn redirect(&self, url: Url) {
        *self
            .redirect_target
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(url);
    }

    fn replace_url(&self, url: Url) {
        *self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = url;
    }
}
