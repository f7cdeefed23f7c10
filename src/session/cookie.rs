//! Cookie handling and the cookie-backed session store
//!
//! Every cookie written by a session store is signed: the value on the wire is
//! `base64url(payload)|issued_at|hmac`. Unsigned, tampered or stale cookies read
//! as "no session".

use crate::session::codec::{decode_session_state, encode_session_state};
use crate::session::state::SessionState;
use crate::session::store::{SessionStore, StoreError};
use crate::utils::crypto::{sign_cookie_value, verify_cookie_signature, FieldCipher};
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpRequest;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Default session cookie name
pub const COOKIE_NAME: &str = "_sessionvault";

/// Browsers drop cookies larger than this
pub const MAX_COOKIE_SIZE: usize = 4096;

/// Options for session cookie creation and validation
#[derive(Clone)]
pub struct CookieOptions {
    pub name: String,
    pub secret: Vec<u8>,
    pub domain: Option<String>,
    pub path: String,
    pub expire: Duration,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: COOKIE_NAME.to_string(),
            secret: Vec::new(),
            domain: None,
            path: "/".to_string(),
            expire: Duration::days(7),
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

impl std::fmt::Debug for CookieOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieOptions")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("expire", &self.expire)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .finish_non_exhaustive()
    }
}

impl CookieOptions {
    /// Build a signed cookie carrying `payload`
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails
    pub fn signed_cookie(&self, payload: &str) -> Result<Cookie<'static>, StoreError> {
        let issued_at = Utc::now().timestamp();
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());
        let signature = sign_cookie_value(&self.secret, &self.name, &encoded, issued_at)
            .map_err(|e| StoreError::Cookie(e.to_string()))?;
        let value = format!("{encoded}|{issued_at}|{signature}");

        if value.len() > MAX_COOKIE_SIZE {
            log::warn!(
                "Session cookie '{}' is {} bytes, browsers may reject it",
                self.name,
                value.len()
            );
        }

        let mut builder = Cookie::build(self.name.clone(), value)
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site)
            .path(self.path.clone())
            .max_age(CookieDuration::seconds(self.expire.num_seconds()));
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        Ok(builder.finish())
    }

    /// Cookie that removes the session cookie from the browser
    #[must_use]
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut builder = Cookie::build(self.name.clone(), "")
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site)
            .path(self.path.clone());
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        let mut cookie = builder.finish();
        cookie.make_removal();
        cookie
    }

    /// Read and verify the signed payload from the request, if any
    #[must_use]
    pub fn read_signed(&self, req: &HttpRequest) -> Option<String> {
        let cookie = req.cookie(&self.name)?;
        self.verify_value(cookie.value())
    }

    /// Verify a raw cookie value and return its payload
    #[must_use]
    pub fn verify_value(&self, value: &str) -> Option<String> {
        let mut parts = value.split('|');
        let (Some(encoded), Some(issued_at), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            log::debug!("Session cookie '{}' is not in signed format", self.name);
            return None;
        };

        let issued_at: i64 = issued_at.parse().ok()?;
        if !verify_cookie_signature(&self.secret, &self.name, encoded, issued_at, signature) {
            log::warn!("Session cookie '{}' has an invalid signature", self.name);
            return None;
        }

        let now = Utc::now().timestamp();
        if issued_at + self.expire.num_seconds() < now {
            log::debug!("Session cookie '{}' is older than the cookie lifetime", self.name);
            return None;
        }

        let payload = general_purpose::URL_SAFE_NO_PAD.decode(encoded).ok()?;
        String::from_utf8(payload).ok()
    }
}

/// Session store that keeps the whole encoded session in the client's cookie
pub struct CookieSessionStore {
    options: CookieOptions,
    cipher: Option<Arc<dyn FieldCipher>>,
}

impl CookieSessionStore {
    #[must_use]
    pub fn new(options: CookieOptions, cipher: Option<Arc<dyn FieldCipher>>) -> Self {
        Self { options, cipher }
    }
}

#[async_trait(?Send)]
impl SessionStore for CookieSessionStore {
    async fn save(
        &self,
        _req: &HttpRequest,
        session: &SessionState,
    ) -> Result<Cookie<'static>, StoreError> {
        let encoded = encode_session_state(session, self.cipher.as_deref())?;
        self.options.signed_cookie(&encoded)
    }

    async fn load(&self, req: &HttpRequest) -> Result<Option<SessionState>, StoreError> {
        let Some(encoded) = self.options.read_signed(req) else {
            return Ok(None);
        };
        let session = decode_session_state(&encoded, self.cipher.as_deref())?;
        Ok(Some(session))
    }

    async fn clear(&self, _req: &HttpRequest) -> Result<Cookie<'static>, StoreError> {
        Ok(self.options.removal_cookie())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::Cipher;
    use actix_web::test::TestRequest;

    fn options() -> CookieOptions {
        CookieOptions {
            secret: b"cookie-signing-secret".to_vec(),
            ..CookieOptions::default()
        }
    }

    fn store() -> CookieSessionStore {
        let cipher: Arc<dyn FieldCipher> = Arc::new(Cipher::new(b"cookie-signing-secret"));
        CookieSessionStore::new(options(), Some(cipher))
    }

    fn sample_session() -> SessionState {
        SessionState {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            email: "user@example.com".to_string(),
            user: "user@example.com".to_string(),
            created_at: Some(Utc::now()),
            expires_on: Some(Utc::now() + Duration::hours(1)),
            ..SessionState::default()
        }
    }

    #[test]
    fn test_signed_cookie_attributes() {
        let cookie = options().signed_cookie("payload").unwrap();

        assert_eq!(cookie.name(), COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(CookieDuration::days(7)));
        assert_eq!(cookie.value().split('|').count(), 3);
    }

    #[test]
    fn test_verify_value_round_trip() {
        let opts = options();
        let cookie = opts.signed_cookie(r#"{"Email":"a@x.com"}"#).unwrap();

        assert_eq!(
            opts.verify_value(cookie.value()).as_deref(),
            Some(r#"{"Email":"a@x.com"}"#)
        );
    }

    #[test]
    fn test_verify_value_rejects_tampering() {
        let opts = options();
        let cookie = opts.signed_cookie("payload").unwrap();
        let parts: Vec<&str> = cookie.value().split('|').collect();
        let forged_payload = general_purpose::URL_SAFE_NO_PAD.encode(b"other");

        assert!(opts
            .verify_value(&format!("{forged_payload}|{}|{}", parts[1], parts[2]))
            .is_none());
        assert!(opts.verify_value("payload").is_none());
        assert!(opts.verify_value("a|b|c|d").is_none());
        assert!(opts.verify_value(&format!("{}|notanumber|{}", parts[0], parts[2])).is_none());
    }

    #[test]
    fn test_verify_value_rejects_other_secret() {
        let cookie = options().signed_cookie("payload").unwrap();
        let other = CookieOptions {
            secret: b"another-secret".to_vec(),
            ..CookieOptions::default()
        };

        assert!(other.verify_value(cookie.value()).is_none());
    }

    #[test]
    fn test_verify_value_rejects_expired_cookie() {
        let opts = options();
        let issued_at = Utc::now().timestamp() - Duration::days(8).num_seconds();
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(b"payload");
        let signature = sign_cookie_value(&opts.secret, &opts.name, &encoded, issued_at).unwrap();

        assert!(opts
            .verify_value(&format!("{encoded}|{issued_at}|{signature}"))
            .is_none());
    }

    #[test]
    fn test_removal_cookie() {
        let opts = CookieOptions {
            domain: Some("example.com".to_string()),
            ..options()
        };
        let cookie = opts.removal_cookie();

        assert_eq!(cookie.name(), COOKIE_NAME);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
        assert_eq!(cookie.domain(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_cookie_store_round_trip() {
        let store = store();
        let session = sample_session();

        let cookie = store
            .save(&TestRequest::default().to_http_request(), &session)
            .await
            .unwrap();
        assert!(!cookie.value().contains("access"));

        let req = TestRequest::default().cookie(cookie).to_http_request();
        let loaded = store.load(&req).await.unwrap().expect("session should load");

        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn test_cookie_store_without_cookie() {
        let req = TestRequest::default().to_http_request();
        assert!(store().load(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cookie_store_without_cipher_keeps_identity() {
        let store = CookieSessionStore::new(options(), None);
        let cookie = store
            .save(&TestRequest::default().to_http_request(), &sample_session())
            .await
            .unwrap();

        let req = TestRequest::default().cookie(cookie).to_http_request();
        let loaded = store.load(&req).await.unwrap().unwrap();

        assert_eq!(loaded.email, "user@example.com");
        assert!(loaded.access_token.is_empty());
        assert!(loaded.refresh_token.is_empty());
    }

    #[tokio::test]
    async fn test_cookie_store_undecodable_payload_is_error() {
        let opts = options();
        let cookie = opts.signed_cookie("a|b|c").unwrap();
        let req = TestRequest::default().cookie(cookie).to_http_request();

        let result = store().load(&req).await;
        assert!(matches!(result, Err(StoreError::Codec(_))));
    }

    #[tokio::test]
    async fn test_cookie_store_clear() {
        let req = TestRequest::default().to_http_request();
        let cookie = store().clear(&req).await.unwrap();

        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
    }
}
