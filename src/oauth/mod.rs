//! OAuth2 provider token lifecycle
//!
//! A [`Provider`] turns an authorization code into a [`SessionState`], looks up the
//! principal's email address and keeps the session alive by redeeming its
//! refresh token once the access token has expired.

pub mod azure;
pub mod refresh;

pub use azure::AzureProvider;
pub use refresh::RefreshCoordinator;

use crate::session::state::{truncate_to_seconds, SessionState};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Seconds subtracted from a token's `expires_in` so it is refreshed before the
/// provider starts rejecting it
pub const EXPIRY_MARGIN_SECS: i64 = 300;

/// Static provider configuration
///
/// Empty strings mean "use the provider's default".
#[derive(Debug, Clone, Default)]
pub struct ProviderData {
    pub provider_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub login_url: String,
    pub redeem_url: String,
    pub profile_url: String,
    pub protected_resource: String,
    pub scope: String,
    pub approval_prompt: String,
}

/// Provider errors
#[derive(Debug)]
pub enum ProviderError {
    MissingCode,
    MissingAccessToken,
    Configuration(String),
    Network(String),
    Status {
        status: u16,
        endpoint: String,
        body: String,
    },
    InvalidResponse(String),
    Profile(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::MissingCode => write!(f, "missing code"),
            ProviderError::MissingAccessToken => write!(f, "missing access token"),
            ProviderError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            ProviderError::Network(msg) => write!(f, "Network error: {msg}"),
            ProviderError::Status {
                status,
                endpoint,
                body,
            } => write!(f, "got {status} from {endpoint:?} {body}"),
            ProviderError::InvalidResponse(msg) => write!(f, "Invalid response: {msg}"),
            ProviderError::Profile(msg) => write!(f, "Profile lookup failed: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

/// An OAuth2 identity provider
#[async_trait]
pub trait Provider: Send + Sync {
    /// Static configuration, with defaults applied
    fn data(&self) -> &ProviderData;

    /// URL the user agent is sent to in order to log in
    fn login_url(&self, redirect_uri: &str, state: &str) -> String;

    /// Exchange an authorization code for a new session
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The code is empty
    /// - The token endpoint is unreachable or answers with a non-200 status
    /// - The token response can't be parsed
    async fn redeem(&self, redirect_uri: &str, code: &str) -> Result<SessionState, ProviderError>;

    /// Look up the email address of the session's principal
    ///
    /// # Errors
    ///
    /// Returns an error if the session has no access token, the profile endpoint
    /// fails, or the profile has no usable address
    async fn email_address(&self, session: &SessionState) -> Result<String, ProviderError>;

    /// Refresh the session in place when its access token has expired
    ///
    /// Returns `Ok(true)` only when the session was changed. Providers without
    /// refresh support never touch the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh exchange fails; the session is left unchanged
    async fn refresh_session_if_needed(
        &self,
        _session: &mut SessionState,
    ) -> Result<bool, ProviderError> {
        Ok(false)
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub id_token: String,
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    pub expires_in: i64,
}

impl TokenResponse {
    /// Build a session from the response, applying the expiry margin
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidResponse`] if `expires_in` puts the expiry
    /// outside the representable time range
    pub fn into_session(self, now: DateTime<Utc>) -> Result<SessionState, ProviderError> {
        let expires_on = expires_on(now, self.expires_in).ok_or_else(|| {
            ProviderError::InvalidResponse(format!(
                "expires_in {} is out of range",
                self.expires_in
            ))
        })?;

        Ok(SessionState {
            access_token: self.access_token,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            created_at: Some(now),
            expires_on: Some(expires_on),
            ..SessionState::default()
        })
    }
}

/// Expiry instant for a token valid for `expires_in` seconds from `now`
///
/// `None` when the lifetime doesn't fit in a timestamp.
#[must_use]
pub fn expires_on(now: DateTime<Utc>, expires_in: i64) -> Option<DateTime<Utc>> {
    let lifetime = expires_in
        .checked_sub(EXPIRY_MARGIN_SECS)
        .and_then(Duration::try_seconds)?;
    now.checked_add_signed(lifetime).map(truncate_to_seconds)
}

// Azure v1 endpoints send `expires_in` as a string; others send a number
fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ExpiresIn {
        Number(i64),
        Text(String),
    }

    match ExpiresIn::deserialize(deserializer)? {
        ExpiresIn::Number(seconds) => Ok(seconds),
        ExpiresIn::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}
