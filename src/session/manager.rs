//! Session Manager
//!
//! `SessionManager` ties the configured [`SessionStore`] to the identity
//! [`Provider`]: it creates sessions from authorization codes, restores and
//! refreshes them per request, and clears them on sign-out.

use crate::oauth::{Provider, ProviderError};
use crate::session::state::SessionState;
use crate::session::store::{SessionStore, StoreError};
use crate::utils::logging::LoggingHelper;
use actix_web::cookie::Cookie;
use actix_web::HttpRequest;
use std::fmt;
use std::sync::Arc;

/// What to do with a session whose refresh failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshFailurePolicy {
    /// Clear the session; the user has to log in again
    #[default]
    Reauthenticate,
    /// Keep serving the stale session and retry on the next request
    KeepStale,
}

impl std::str::FromStr for RefreshFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reauthenticate" => Ok(Self::Reauthenticate),
            "keep_stale" => Ok(Self::KeepStale),
            other => Err(format!("unknown refresh failure policy '{other}'")),
        }
    }
}

/// Session lifecycle errors
#[derive(Debug)]
pub enum SessionError {
    Provider(ProviderError),
    Store(StoreError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Provider(err) => write!(f, "Provider error: {err}"),
            SessionError::Store(err) => write!(f, "Session store error: {err}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        SessionError::Provider(err)
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Store(err)
    }
}

/// Result of restoring the session for a request
#[derive(Debug)]
pub enum AuthOutcome {
    /// A usable session; `cookie` is set when the session was refreshed and re-saved
    Authenticated {
        session: SessionState,
        cookie: Option<Cookie<'static>>,
    },
    /// No usable session; `cookie` removes a session that had to be discarded
    Unauthenticated { cookie: Option<Cookie<'static>> },
}

impl AuthOutcome {
    #[must_use]
    pub fn session(&self) -> Option<&SessionState> {
        match self {
            AuthOutcome::Authenticated { session, .. } => Some(session),
            AuthOutcome::Unauthenticated { .. } => None,
        }
    }

    #[must_use]
    pub fn cookie(&self) -> Option<&Cookie<'static>> {
        match self {
            AuthOutcome::Authenticated { cookie, .. } | AuthOutcome::Unauthenticated { cookie } => {
                cookie.as_ref()
            }
        }
    }
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn Provider>,
    policy: RefreshFailurePolicy,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
        policy: RefreshFailurePolicy,
    ) -> Self {
        Self {
            store,
            provider,
            policy,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    #[must_use]
    pub fn policy(&self) -> RefreshFailurePolicy {
        self.policy
    }

    /// Redeem an authorization code and persist the resulting session
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The code can't be redeemed
    /// - The principal's email can't be looked up
    /// - The session can't be saved
    pub async fn complete_login(
        &self,
        req: &HttpRequest,
        redirect_uri: &str,
        code: &str,
    ) -> Result<(SessionState, Cookie<'static>), SessionError> {
        let mut session = self.provider.redeem(redirect_uri, code).await?;
        if session.email.is_empty() {
            session.email = self.provider.email_address(&session).await?;
        }
        session.normalize_user();

        // A ticket the client brought along must not become the new session's
        if let Err(err) = self.store.clear(req).await {
            log::warn!("Failed to clear pre-login session: {err}");
        }
        let cookie = self.store.save(req, &session).await?;
        LoggingHelper::log_session_created(&session, &self.provider.data().provider_name);
        Ok((session, cookie))
    }

    /// Restore the request's session, refreshing it when its token has expired
    ///
    /// Never fails: unreadable sessions and failed refreshes make the request
    /// unauthenticated (or stale, depending on the policy).
    pub async fn authenticate(&self, req: &HttpRequest) -> AuthOutcome {
        let mut session = match self.store.load(req).await {
            Ok(Some(session)) => session,
            Ok(None) => return AuthOutcome::Unauthenticated { cookie: None },
            Err(err) => {
                LoggingHelper::log_session_load_failed(&err);
                return self.discard(req).await;
            }
        };

        match self.provider.refresh_session_if_needed(&mut session).await {
            Ok(true) => {
                let cookie = match self.store.save(req, &session).await {
                    Ok(cookie) => Some(cookie),
                    Err(err) => {
                        log::warn!("Failed to save refreshed session for {}: {err}", session.email);
                        None
                    }
                };
                AuthOutcome::Authenticated { session, cookie }
            }
            Ok(false) if session.is_expired() => {
                log::info!("Removing session {session}: token expired and can't be refreshed");
                self.discard(req).await
            }
            Ok(false) => AuthOutcome::Authenticated {
                session,
                cookie: None,
            },
            Err(err) => match self.policy {
                RefreshFailurePolicy::Reauthenticate => {
                    log::info!("Removing session {session}: refresh failed: {err}");
                    self.discard(req).await
                }
                RefreshFailurePolicy::KeepStale => {
                    log::warn!("Serving stale session {session}: refresh failed: {err}");
                    AuthOutcome::Authenticated {
                        session,
                        cookie: None,
                    }
                }
            },
        }
    }

    /// Clear the request's session
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to remove the session
    pub async fn sign_out(&self, req: &HttpRequest) -> Result<Cookie<'static>, SessionError> {
        Ok(self.store.clear(req).await?)
    }

    async fn discard(&self, req: &HttpRequest) -> AuthOutcome {
        let cookie = self
            .store
            .clear(req)
            .await
            .inspect_err(|err| log::warn!("Failed to clear session: {err}"))
            .ok();
        AuthOutcome::Unauthenticated { cookie }
    }
}
