//! Azure AD (v1 endpoints) provider

use crate::oauth::refresh::RefreshCoordinator;
use crate::oauth::{Provider, ProviderData, ProviderError, TokenResponse};
use crate::session::state::SessionState;
use crate::utils::logging::LoggingHelper;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TENANT: &str = "common";
pub const DEFAULT_PROFILE_URL: &str = "https://graph.microsoft.com/v1.0/me";
pub const DEFAULT_PROTECTED_RESOURCE: &str = "https://graph.microsoft.com";
pub const DEFAULT_SCOPE: &str = "openid";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const LOGIN_HOST: &str = "https://login.microsoftonline.com";

/// Azure identity provider
pub struct AzureProvider {
    data: ProviderData,
    tenant: String,
    login_url: Url,
    http_client: reqwest::Client,
    coordinator: RefreshCoordinator,
}

impl AzureProvider {
    /// Create the provider, filling every unset endpoint with its Azure default
    ///
    /// # Errors
    ///
    /// Returns an error if the login URL is invalid or the HTTP client can't be built
    pub fn new(
        mut data: ProviderData,
        tenant: &str,
        http_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let tenant = if tenant.is_empty() {
            DEFAULT_TENANT.to_string()
        } else {
            tenant.to_string()
        };

        data.provider_name = "Azure".to_string();
        if data.profile_url.is_empty() {
            data.profile_url = DEFAULT_PROFILE_URL.to_string();
        }
        if data.protected_resource.is_empty() {
            data.protected_resource = DEFAULT_PROTECTED_RESOURCE.to_string();
        }
        if data.scope.is_empty() {
            data.scope = DEFAULT_SCOPE.to_string();
        }
        if data.login_url.is_empty() {
            data.login_url = format!("{LOGIN_HOST}/{tenant}/oauth2/authorize");
        }
        if data.redeem_url.is_empty() {
            data.redeem_url = format!("{LOGIN_HOST}/{tenant}/oauth2/token");
        }

        let login_url = Url::parse(&data.login_url).map_err(|e| {
            ProviderError::Configuration(format!("Invalid login URL '{}': {e}", data.login_url))
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        LoggingHelper::log_provider_configured(&data.provider_name, &tenant, &data.redeem_url);

        Ok(Self {
            data,
            tenant,
            login_url,
            http_client,
            coordinator: RefreshCoordinator::default(),
        })
    }

    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// POST a token request and parse the answer into a fresh session
    async fn request_token(
        &self,
        grant_type: &str,
        params: &[(&str, &str)],
    ) -> Result<SessionState, ProviderError> {
        LoggingHelper::log_token_exchange_start(&self.data.provider_name, grant_type);

        let response = self
            .http_client
            .post(&self.data.redeem_url)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                endpoint: self.data.redeem_url.clone(),
                body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::InvalidResponse(format!("decoding {grant_type} response failed, {e}"))
        })?;

        let session = token.into_session(Utc::now())?;
        LoggingHelper::log_token_exchange_summary(&self.data.provider_name, &session);
        Ok(session)
    }

    async fn redeem_refresh_token(&self, refresh_token: &str) -> Result<SessionState, ProviderError> {
        let mut session = self
            .request_token(
                "refresh_token",
                &[
                    ("client_id", self.data.client_id.as_str()),
                    ("client_secret", self.data.client_secret.as_str()),
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                    ("resource", self.data.protected_resource.as_str()),
                ],
            )
            .await?;

        if session.refresh_token.is_empty() {
            session.refresh_token = refresh_token.to_string();
        }
        session.email = self.email_address(&session).await?;
        Ok(session)
    }
}

#[async_trait]
impl Provider for AzureProvider {
    fn data(&self) -> &ProviderData {
        &self.data
    }

    fn login_url(&self, redirect_uri: &str, state: &str) -> String {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in self.login_url.query_pairs() {
            params
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }

        let mut set = |key: &str, value: &str| {
            params.insert(key.to_string(), vec![value.to_string()]);
        };
        set("redirect_uri", redirect_uri);
        set("client_id", &self.data.client_id);
        set("response_type", "code");
        if !self.data.approval_prompt.is_empty() {
            // Azure uses "prompt" rather than "approval_prompt"
            set("prompt", &self.data.approval_prompt);
        }
        params
            .entry("scope".to_string())
            .or_default()
            .push(self.data.scope.clone());
        params
            .entry("state".to_string())
            .or_default()
            .push(state.to_string());

        let mut url = self.login_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            for (key, values) in &params {
                for value in values {
                    query.append_pair(key, value);
                }
            }
        }
        url.to_string()
    }

    async fn redeem(&self, redirect_uri: &str, code: &str) -> Result<SessionState, ProviderError> {
        if code.is_empty() {
            return Err(ProviderError::MissingCode);
        }

        let mut params = vec![
            ("redirect_uri", redirect_uri),
            ("client_id", self.data.client_id.as_str()),
            ("client_secret", self.data.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];
        if !self.data.protected_resource.is_empty() {
            params.push(("resource", self.data.protected_resource.as_str()));
        }

        self.request_token("authorization_code", &params).await
    }

    async fn email_address(&self, session: &SessionState) -> Result<String, ProviderError> {
        if session.access_token.is_empty() {
            return Err(ProviderError::MissingAccessToken);
        }

        let response = self
            .http_client
            .get(&self.data.profile_url)
            .header(AUTHORIZATION, format!("Bearer {}", session.access_token))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                endpoint: self.data.profile_url.clone(),
                body,
            });
        }

        let profile: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("decoding profile failed, {e}")))?;

        email_from_profile(&profile).ok_or_else(|| {
            log::warn!("failed to get email address from {}", self.data.profile_url);
            ProviderError::Profile("no email address in profile".to_string())
        })
    }

    async fn refresh_session_if_needed(
        &self,
        session: &mut SessionState,
    ) -> Result<bool, ProviderError> {
        let now = Utc::now();
        LoggingHelper::log_refresh_check(session, now);

        if session.expires_on.is_none() {
            LoggingHelper::log_refresh_skipped("session has no expiry");
            return Ok(false);
        }
        if session.is_valid_at(now) {
            LoggingHelper::log_refresh_skipped("access token still valid");
            return Ok(false);
        }
        if session.refresh_token.is_empty() {
            LoggingHelper::log_refresh_skipped("no refresh token");
            return Ok(false);
        }

        let refresh_token = session.refresh_token.clone();
        let refreshed = self
            .coordinator
            .run(&refresh_token, || self.redeem_refresh_token(&refresh_token))
            .await
            .inspect_err(|e| LoggingHelper::log_refresh_failed(&self.data.provider_name, e))?;

        let previous_expiry = session.expires_on;
        session.apply_refresh(&refreshed);
        LoggingHelper::log_refresh_success(
            &self.data.provider_name,
            previous_expiry,
            session.expires_on,
        );
        Ok(true)
    }
}

/// Probe `mail`, then the first of `otherMails`, then `userPrincipalName`
fn email_from_profile(profile: &Value) -> Option<String> {
    let non_empty = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    non_empty(profile.get("mail"))
        .or_else(|| non_empty(profile.get("otherMails").and_then(|mails| mails.get(0))))
        .or_else(|| non_empty(profile.get("userPrincipalName")))
}
