//! Fluent builders for creating customizable test objects

use crate::session::state::SessionState;
use chrono::{Duration, Utc};

use super::constants::{TEST_EMAIL, TEST_USER};

/// Builder for creating customized test sessions
pub struct TestSessionBuilder {
    session: SessionState,
}

impl Default for TestSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSessionBuilder {
    /// Session with tokens that expires in one hour
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            session: SessionState {
                access_token: "test_access_token".to_string(),
                id_token: "test_id_token".to_string(),
                refresh_token: "test_refresh_token".to_string(),
                email: TEST_EMAIL.to_string(),
                user: TEST_USER.to_string(),
                created_at: Some(now),
                expires_on: Some(now + Duration::hours(1)),
            },
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: &str) -> Self {
        self.session.email = email.to_string();
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: &str) -> Self {
        self.session.user = user.to_string();
        self
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: &str) -> Self {
        self.session.refresh_token = refresh_token.to_string();
        self
    }

    #[must_use]
    pub fn without_refresh_token(mut self) -> Self {
        self.session.refresh_token.clear();
        self
    }

    #[must_use]
    pub fn expires_in_minutes(mut self, minutes: i64) -> Self {
        self.session.expires_on = Some(Utc::now() + Duration::minutes(minutes));
        self
    }

    /// Access token expired one minute ago
    #[must_use]
    pub fn expired(self) -> Self {
        self.expires_in_minutes(-1)
    }

    #[must_use]
    pub fn without_expiry(mut self) -> Self {
        self.session.expires_on = None;
        self
    }

    #[must_use]
    pub fn build(self) -> SessionState {
        self.session
    }
}
