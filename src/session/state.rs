//! Session record
//!
//! `SessionState` is the decoded, in-memory credential bundle for one principal.
//! Each request owns its own copy; concurrent requests for the same principal
//! hold independent copies, which is why refreshes are coordinated by key in
//! [`crate::oauth::refresh`] rather than by locking the record.

use chrono::{DateTime, Duration, DurationRound, Utc};
use std::fmt;

/// Credentials and validity window of an authenticated principal
///
/// Empty strings mean "absent" for the token and identity fields. `None`
/// timestamps replace the zero time: an unset `expires_on` never expires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub email: String,
    pub user: String,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_on: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Check whether the session has expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check expiry against an explicit instant
    ///
    /// A session expiring exactly at `now` counts as expired, matching the
    /// refresh rule that only skips sessions whose expiry is strictly after now.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.is_some_and(|expires_on| expires_on <= now)
    }

    /// Whether the access token is still valid at `now` so a refresh can be skipped
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.is_some_and(|expires_on| expires_on > now)
    }

    /// Age of the session, zero when `created_at` is unset
    #[must_use]
    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    /// Age of the session relative to `now`, which is truncated to whole seconds
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        self.created_at.map_or_else(Duration::zero, |created_at| {
            truncate_to_seconds(now) - created_at
        })
    }

    /// Fill `user` from `email` when it is empty
    pub(crate) fn normalize_user(&mut self) {
        if self.user.is_empty() {
            self.user.clone_from(&self.email);
        }
    }

    /// Copy of the identity fields only
    #[must_use]
    pub fn reduced(&self) -> Self {
        Self {
            email: self.email.clone(),
            user: self.user.clone(),
            ..Self::default()
        }
    }

    /// Overwrite the fields a token refresh is allowed to change
    ///
    /// `id_token` and `user` are kept: refresh responses don't carry an ID token
    /// and the principal identifier must not change under an existing session.
    pub fn apply_refresh(&mut self, refreshed: &Self) {
        self.access_token.clone_from(&refreshed.access_token);
        self.refresh_token.clone_from(&refreshed.refresh_token);
        self.email.clone_from(&refreshed.email);
        self.created_at = refreshed.created_at;
        self.expires_on = refreshed.expires_on;
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session{{email:{} user:{}", self.email, self.user)?;
        if !self.access_token.is_empty() {
            f.write_str(" token:true")?;
        }
        if !self.id_token.is_empty() {
            f.write_str(" id_token:true")?;
        }
        if let Some(created_at) = self.created_at {
            write!(f, " created:{created_at}")?;
        }
        if let Some(expires_on) = self.expires_on {
            write!(f, " expires:{expires_on}")?;
        }
        if !self.refresh_token.is_empty() {
            f.write_str(" refresh_token:true")?;
        }
        f.write_str("}")
    }
}

/// Drop sub-second precision from a timestamp
#[must_use]
pub fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(Duration::seconds(1)).unwrap_or(time)
}
