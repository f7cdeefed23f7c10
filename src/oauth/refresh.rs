//! Per-credential single-flight for refresh token exchanges
//!
//! Concurrent requests of one principal each decode their own copy of the
//! session, so without coordination every one of them would redeem the same
//! refresh token. Identity providers rotate refresh tokens on use, which makes
//! all but the first exchange fail. The coordinator serialises exchanges per
//! refresh token and hands the winner's result to everyone queued behind it.

use crate::oauth::ProviderError;
use crate::session::state::SessionState;
use crate::utils::crypto::sha256_hex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// How long a successful exchange is reused for late callers holding the old token
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Completed {
    session: SessionState,
    at: Instant,
}

#[derive(Debug, Default)]
struct Flight {
    result: tokio::sync::Mutex<Option<Completed>>,
}

impl Flight {
    fn is_live(&self, retention: Duration) -> bool {
        // Locked means an exchange is running
        self.result.try_lock().map_or(true, |done| {
            done.as_ref()
                .is_some_and(|completed| completed.at.elapsed() < retention)
        })
    }
}

/// Keyed single-flight over refresh token exchanges
#[derive(Debug)]
pub struct RefreshCoordinator {
    retention: Duration,
    flights: Mutex<HashMap<String, Arc<Flight>>>,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Run `exchange` for `refresh_token` unless another caller already did
    ///
    /// Callers with the same refresh token wait for the one in flight. When it
    /// succeeded they receive its session instead of exchanging again. Failures
    /// are not shared: the next waiter makes its own attempt.
    ///
    /// # Errors
    ///
    /// Returns the error of this caller's own exchange
    pub async fn run<F, Fut>(
        &self,
        refresh_token: &str,
        exchange: F,
    ) -> Result<SessionState, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionState, ProviderError>>,
    {
        let flight = self.flight_for(&sha256_hex(refresh_token));
        let mut result = flight.result.lock().await;

        if let Some(completed) = result.as_ref() {
            if completed.at.elapsed() < self.retention {
                log::debug!("Reusing refresh result from a concurrent request");
                return Ok(completed.session.clone());
            }
        }

        let session = exchange().await?;
        *result = Some(Completed {
            session: session.clone(),
            at: Instant::now(),
        });
        Ok(session)
    }

    /// Number of tracked refresh tokens
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn flight_for(&self, key: &str) -> Arc<Flight> {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        flights.retain(|existing, flight| {
            existing == key || Arc::strong_count(flight) > 1 || flight.is_live(self.retention)
        });
        Arc::clone(flights.entry(key.to_string()).or_default())
    }
}
