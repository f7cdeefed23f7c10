//! Session store contract and backend selection

use crate::session::cache::CacheSessionStore;
use crate::session::codec::CodecError;
use crate::session::cookie::{CookieOptions, CookieSessionStore};
use crate::session::state::SessionState;
use crate::utils::crypto::FieldCipher;
use crate::utils::logging::LoggingHelper;
use actix_web::cookie::Cookie;
use actix_web::HttpRequest;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Session store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Invalid store configuration
    #[error("{0}")]
    Config(String),
    /// The stored session could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Building or reading the session cookie failed
    #[error("session cookie error: {0}")]
    Cookie(String),
}

/// Persistence of one session per client
///
/// Implementations are keyed by the client's request (its cookies) and hand back
/// the cookie the response must carry. A request without a usable session loads
/// as `Ok(None)`; a session that is present but corrupt is an error.
#[async_trait(?Send)]
pub trait SessionStore: Send + Sync {
    /// Persist `session` and return the cookie that identifies it
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be encoded
    async fn save(
        &self,
        req: &HttpRequest,
        session: &SessionState,
    ) -> Result<Cookie<'static>, StoreError>;

    /// Load the session associated with the request
    ///
    /// # Errors
    ///
    /// Returns an error if a stored session exists but cannot be decoded
    async fn load(&self, req: &HttpRequest) -> Result<Option<SessionState>, StoreError>;

    /// Remove the session and return the cookie that clears it client-side
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to remove the session
    async fn clear(&self, req: &HttpRequest) -> Result<Cookie<'static>, StoreError>;
}

/// Known session store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Cookie,
    Cache,
}

impl FromStr for StoreKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cookie" => Ok(Self::Cookie),
            "cache" => Ok(Self::Cache),
            other => Err(StoreError::Config(format!(
                "unknown session store type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cookie => f.write_str("cookie"),
            Self::Cache => f.write_str("cache"),
        }
    }
}

/// Everything a backend needs to be constructed
#[derive(Clone)]
pub struct StoreOptions {
    pub kind: String,
    pub cookie: CookieOptions,
    pub cipher: Option<Arc<dyn FieldCipher>>,
    pub sweep_interval: Duration,
}

/// Build the configured session store
///
/// # Errors
///
/// Returns [`StoreError::Config`] if the store kind is unknown
pub fn new_session_store(options: StoreOptions) -> Result<Arc<dyn SessionStore>, StoreError> {
    let kind: StoreKind = options.kind.parse()?;

    LoggingHelper::log_session_store_selected(
        &kind.to_string(),
        &options.cookie.name,
        options.cipher.is_some(),
    );

    match kind {
        StoreKind::Cookie => Ok(Arc::new(CookieSessionStore::new(
            options.cookie,
            options.cipher,
        ))),
        StoreKind::Cache => {
            let store = Arc::new(CacheSessionStore::new(options.cookie, options.cipher));
            if store.spawn_sweeper(options.sweep_interval).is_none() {
                log::warn!("No async runtime available, cached sessions are only expired on read");
            }
            Ok(store)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::Cipher;

    fn options(kind: &str) -> StoreOptions {
        StoreOptions {
            kind: kind.to_string(),
            cookie: CookieOptions {
                secret: b"secret".to_vec(),
                ..CookieOptions::default()
            },
            cipher: Some(Arc::new(Cipher::new(b"secret"))),
            sweep_interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_store_kind_parsing() {
        assert_eq!("cookie".parse::<StoreKind>().unwrap(), StoreKind::Cookie);
        assert_eq!("cache".parse::<StoreKind>().unwrap(), StoreKind::Cache);
        assert_eq!(StoreKind::Cache.to_string(), "cache");
    }

    #[test]
    fn test_unknown_store_kind_is_config_error() {
        let result = new_session_store(options("bogus"));

        match result {
            Err(StoreError::Config(message)) => {
                assert_eq!(message, "unknown session store type 'bogus'");
            }
            Err(other) => panic!("expected config error, got {other}"),
            Ok(_) => panic!("expected config error, got a store"),
        }
    }

    #[test]
    fn test_cookie_store_selected() {
        assert!(new_session_store(options("cookie")).is_ok());
    }

    #[tokio::test]
    async fn test_cache_store_selected() {
        assert!(new_session_store(options("cache")).is_ok());
    }
}
