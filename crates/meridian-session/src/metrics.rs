//! Session metrics
//!
//! Counter wrappers over the `metrics` facade. The library only records;
//! installing a recorder and exposing it is the embedding application's
//! choice, and without one these calls are no-ops.
//!
//! - `session_verifications_total` (counter): label `outcome`
//! - `session_logins_total` (counter): label `outcome`
//! - `session_logouts_total` (counter)
//! - `provider_redirects_total` (counter): label `provider`

/// Record a settled verification cycle with its outcome label.
pub fn record_verification(outcome: &str) {
    metrics::counter!("session_verifications_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a login attempt.
pub fn record_login(outcome: &str) {
    metrics::counter!("session_logins_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a logout.
pub fn record_logout() {
    metrics::counter!("session_logouts_total").increment(1);
}

/// Record a handoff redirect to a federated provider.
pub fn record_provider_redirect(provider: &str) {
    metrics::counter!("provider_redirects_total", "provider" => provider.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_noop() {
        record_verification("anonymous");
        record_login("success");
        record_logout();
        record_provider_redirect("corp-idp");
    }
}
