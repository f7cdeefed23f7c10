//! Test fixtures providing pre-built test objects

use crate::session::cookie::{CookieOptions, CookieSessionStore};
use crate::session::store::{new_session_store, SessionStore, StoreOptions};
use crate::settings::Settings;
use crate::utils::crypto::{Cipher, FieldCipher};
use std::sync::Arc;
use std::time::Duration;

use super::constants::TEST_SECRET;

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Cookie options signed with the test secret
    #[must_use]
    pub fn cookie_options() -> CookieOptions {
        CookieOptions {
            secret: TEST_SECRET.to_vec(),
            ..CookieOptions::default()
        }
    }

    /// AES-GCM cipher keyed with the test secret
    #[must_use]
    pub fn cipher() -> Arc<dyn FieldCipher> {
        Arc::new(Cipher::new(TEST_SECRET))
    }

    /// Cookie-backed store with encryption enabled
    #[must_use]
    pub fn cookie_store() -> Arc<dyn SessionStore> {
        Arc::new(CookieSessionStore::new(
            Self::cookie_options(),
            Some(Self::cipher()),
        ))
    }

    /// Store of the given kind built through the regular factory
    ///
    /// # Panics
    ///
    /// Panics if `kind` is not a known store type
    #[must_use]
    pub fn store(kind: &str) -> Arc<dyn SessionStore> {
        new_session_store(StoreOptions {
            kind: kind.to_string(),
            cookie: Self::cookie_options(),
            cipher: Some(Self::cipher()),
            sweep_interval: Duration::from_secs(60),
        })
        .expect("test store kind should be valid")
    }

    /// Settings with a fixed secret and no file or environment input
    #[must_use]
    pub fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.session.cookie_secret = String::from_utf8_lossy(TEST_SECRET).into_owned();
        settings.provider.client_id = "test-client-id".to_string();
        settings.provider.client_secret = "test-client-secret".to_string();
        settings
    }
}
