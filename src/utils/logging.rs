// Centralized logging for the session lifecycle
//
// Token values are never logged, only their presence and length.
use crate::session::state::SessionState;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log provider initialization
    pub fn log_provider_configured(provider: &str, tenant: &str, redeem_url: &str) {
        info!("✅ {provider} provider configured (tenant: {tenant}, token endpoint: {redeem_url})");
    }

    /// Log which session store backend is in use
    pub fn log_session_store_selected(kind: &str, cookie_name: &str, encrypted: bool) {
        info!(
            "🍪 Using {kind} session store (cookie: {cookie_name}, token encryption: {})",
            if encrypted { "enabled" } else { "disabled" }
        );
        if !encrypted {
            warn!("Session tokens will not be persisted without a cipher, only identity is kept");
        }
    }

    /// Log token exchange start
    pub fn log_token_exchange_start(provider: &str, grant_type: &str) {
        info!("🔄 Exchanging {grant_type} with {provider}");
    }

    /// Log token exchange summary
    pub fn log_token_exchange_summary(provider: &str, session: &SessionState) {
        info!(
            "🔍 Token exchange summary for {}: access_token_len={}, refresh_token={}, expires_on={:?}",
            provider,
            session.access_token.len(),
            if session.refresh_token.is_empty() { "missing" } else { "present" },
            session.expires_on
        );
    }

    /// Log the refresh decision inputs
    pub fn log_refresh_check(session: &SessionState, now: DateTime<Utc>) {
        debug!(
            "Refresh check: refresh_token_len={}, expires_on={:?}, still_valid={}",
            session.refresh_token.len(),
            session.expires_on,
            session.is_valid_at(now)
        );
    }

    /// Log that a refresh was skipped
    pub fn log_refresh_skipped(reason: &str) {
        debug!("Refresh skipped: {reason}");
    }

    /// Log a successful refresh
    pub fn log_refresh_success(
        provider: &str,
        previous_expiry: Option<DateTime<Utc>>,
        next_expiry: Option<DateTime<Utc>>,
    ) {
        info!("✅ {provider}: refreshed access token (expired on {previous_expiry:?}, next: {next_expiry:?})");
    }

    /// Log a failed refresh
    pub fn log_refresh_failed(provider: &str, error: &dyn std::fmt::Display) {
        warn!("❌ {provider}: refresh failed: {error}");
    }

    /// Log session creation success
    pub fn log_session_created(session: &SessionState, provider: &str) {
        info!("Successfully built session for user: {} (provider: {provider})", session.email);
    }

    /// Log a session that could not be restored from the request
    pub fn log_session_load_failed(error: &dyn std::fmt::Display) {
        warn!("Discarding unreadable session: {error}");
    }
}
