//! Session state snapshot
//!
//! One value, owned by the controller and published through a watch channel.
//! Consumers treat it as read-only; every mutation happens inside a
//! controller operation so two invariants hold at every observable state:
//! logged-in implies authenticated, and a token is present exactly when the
//! session is authenticated.

/// Point-in-time view of the authentication session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// A usable credential (guest or named user) is present
    pub is_authenticated: bool,
    /// The credential belongs to a named user
    pub is_logged_in: bool,
    /// Current access credential
    pub token: Option<String>,
    /// A verification or login cycle is in progress
    pub auth_loading: bool,
}

impl Session {
    /// Initial state: nothing known yet, first verification still ahead.
    pub fn initializing() -> Self {
        Self {
            is_authenticated: false,
            is_logged_in: false,
            token: None,
            auth_loading: true,
        }
    }

    /// No credential present.
    pub fn unauthenticated() -> Self {
        Self {
            is_authenticated: false,
            is_logged_in: false,
            token: None,
            auth_loading: false,
        }
    }

    /// A usable credential is present; `logged_in` marks a named user as
    /// opposed to a guest.
    pub fn authenticated(token: String, logged_in: bool) -> Self {
        Self {
            is_authenticated: true,
            is_logged_in: logged_in,
            token: Some(token),
            auth_loading: false,
        }
    }

    /// Copy of this session with the loading flag raised.
    pub fn loading(mut self) -> Self {
        self.auth_loading = true;
        self
    }

    /// Phase label for logs and metrics.
    pub fn phase(&self) -> &'static str {
        if self.auth_loading {
            "verifying"
        } else if self.is_logged_in {
            "user"
        } else if self.is_authenticated {
            "anonymous"
        } else {
            "unauthenticated"
        }
    }
}
