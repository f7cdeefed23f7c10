//! Server-side session cache
//!
//! The session itself stays in process memory; the client only receives a signed
//! cookie holding an opaque ticket. Entries expire on the cookie lifetime and a
//! background task sweeps them independently of any request.

use crate::session::codec::{decode_session_state, encode_session_state};
use crate::session::cookie::CookieOptions;
use crate::session::state::SessionState;
use crate::session::store::{SessionStore, StoreError};
use crate::utils::crypto::{generate_nonce, FieldCipher};
use actix_web::cookie::Cookie;
use actix_web::HttpRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Session store backed by an in-memory map of ticket to encoded session
pub struct CacheSessionStore {
    cookie: CookieOptions,
    cipher: Option<Arc<dyn FieldCipher>>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CacheSessionStore {
    #[must_use]
    pub fn new(cookie: CookieOptions, cipher: Option<Arc<dyn FieldCipher>>) -> Self {
        Self {
            cookie,
            cipher,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached sessions, including expired ones not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose lifetime has passed, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Start the periodic sweep on the current tokio runtime
    ///
    /// Returns `None` outside a runtime. The task ends once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let store: Weak<Self> = Arc::downgrade(self);

        Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.sweep_expired();
                if removed > 0 {
                    log::debug!("Swept {removed} expired cached sessions");
                }
            }
        }))
    }

    fn ticket(&self, req: &HttpRequest) -> Option<String> {
        self.cookie.read_signed(req)
    }

    fn remove(&self, ticket: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(ticket);
    }
}

fn new_ticket() -> String {
    format!("{}.{}", uuid::Uuid::new_v4().simple(), generate_nonce(16))
}

#[async_trait(?Send)]
impl SessionStore for CacheSessionStore {
    async fn save(
        &self,
        req: &HttpRequest,
        session: &SessionState,
    ) -> Result<Cookie<'static>, StoreError> {
        let value = encode_session_state(session, self.cipher.as_deref())?;
        let now = Utc::now();
        let entry = CacheEntry {
            value,
            expires_at: now + self.cookie.expire,
        };

        // Keep a live ticket so other requests still carrying it see the update
        let ticket = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let ticket = self
                .ticket(req)
                .filter(|ticket| entries.get(ticket).is_some_and(|e| e.expires_at > now))
                .unwrap_or_else(new_ticket);
            entries.insert(ticket.clone(), entry);
            ticket
        };

        self.cookie.signed_cookie(&ticket)
    }

    async fn load(&self, req: &HttpRequest) -> Result<Option<SessionState>, StoreError> {
        let Some(ticket) = self.ticket(req) else {
            return Ok(None);
        };

        let entry = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ticket)
            .cloned();

        let Some(entry) = entry else {
            log::debug!("Session ticket not found in cache");
            return Ok(None);
        };
        if entry.expires_at <= Utc::now() {
            self.remove(&ticket);
            return Ok(None);
        }

        let session = decode_session_state(&entry.value, self.cipher.as_deref())?;
        Ok(Some(session))
    }

    async fn clear(&self, req: &HttpRequest) -> Result<Cookie<'static>, StoreError> {
        if let Some(ticket) = self.ticket(req) {
            self.remove(&ticket);
        }
        Ok(self.cookie.removal_cookie())
    }
}
