//! Mock objects and fake implementations for testing

use crate::oauth::{Provider, ProviderData, ProviderError};
use crate::session::state::SessionState;
use crate::utils::crypto::FieldCipher;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

/// How [`MockProvider`] answers a refresh of an expired session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshBehavior {
    /// Refresh is not supported
    #[default]
    Unsupported,
    Succeed,
    Fail,
}

/// In-process provider that never touches the network
#[derive(Debug, Default)]
pub struct MockProvider {
    data: ProviderData,
    refresh: RefreshBehavior,
    refresh_calls: AtomicUsize,
}

impl MockProvider {
    pub const EMAIL: &'static str = "mock@example.com";
    pub const ACCESS_TOKEN: &'static str = "mock_access_token";
    pub const REFRESHED_ACCESS_TOKEN: &'static str = "mock_refreshed_access_token";

    #[must_use]
    pub fn new() -> Self {
        Self {
            data: ProviderData {
                provider_name: "Mock".to_string(),
                login_url: "https://login.example.com/authorize".to_string(),
                ..ProviderData::default()
            },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_refresh(mut self, refresh: RefreshBehavior) -> Self {
        self.refresh = refresh;
        self
    }

    /// Number of refresh exchanges performed
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn data(&self) -> &ProviderData {
        &self.data
    }

    fn login_url(&self, redirect_uri: &str, state: &str) -> String {
        format!("{}?redirect_uri={redirect_uri}&state={state}", self.data.login_url)
    }

    async fn redeem(&self, _redirect_uri: &str, code: &str) -> Result<SessionState, ProviderError> {
        if code.is_empty() {
            return Err(ProviderError::MissingCode);
        }
        let now = Utc::now();
        Ok(SessionState {
            access_token: Self::ACCESS_TOKEN.to_string(),
            refresh_token: format!("mock_refresh_{code}"),
            created_at: Some(now),
            expires_on: Some(now + Duration::hours(1)),
            ..SessionState::default()
        })
    }

    async fn email_address(&self, session: &SessionState) -> Result<String, ProviderError> {
        if session.access_token.is_empty() {
            return Err(ProviderError::MissingAccessToken);
        }
        Ok(Self::EMAIL.to_string())
    }

    async fn refresh_session_if_needed(
        &self,
        session: &mut SessionState,
    ) -> Result<bool, ProviderError> {
        let now = Utc::now();
        if self.refresh == RefreshBehavior::Unsupported
            || session.expires_on.is_none()
            || session.is_valid_at(now)
            || session.refresh_token.is_empty()
        {
            return Ok(false);
        }

        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match self.refresh {
            RefreshBehavior::Succeed => {
                session.apply_refresh(&SessionState {
                    access_token: Self::REFRESHED_ACCESS_TOKEN.to_string(),
                    refresh_token: format!("{}_next", session.refresh_token),
                    email: session.email.clone(),
                    created_at: Some(now),
                    expires_on: Some(now + Duration::hours(1)),
                    ..SessionState::default()
                });
                Ok(true)
            }
            _ => Err(ProviderError::Network("mock refresh failure".to_string())),
        }
    }
}

/// Cipher that always fails, for exercising strict and best-effort decryption
pub struct FailingCipher;

impl FieldCipher for FailingCipher {
    fn encrypt(&self, _plaintext: &str) -> Result<String> {
        Err(anyhow!("encryption unavailable"))
    }

    fn decrypt(&self, _ciphertext: &str) -> Result<String> {
        Err(anyhow!("not ciphertext"))
    }
}
