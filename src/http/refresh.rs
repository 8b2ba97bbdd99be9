//! Session refresh with a single-flight guard.
//!
//! Any number of requests may see an expired session at the same time. The
//! first one starts a refresh; every other one joins it and observes the same
//! outcome. The refresh runs as its own task, so a caller that gives up on its
//! request does not cancel the refresh for the others.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::Url;
use tracing::{debug, warn};

/// Performs one call to the refresh endpoint.
#[async_trait::async_trait]
pub trait SessionRefresher: Send + Sync {
    /// Returns true when the session was renewed. Must not fail: transport
    /// problems are a failed refresh.
    async fn refresh(&self, http: &reqwest::Client, url: &Url) -> bool;
}

/// `POST` to the refresh endpoint with the client's cookies; 2xx is success.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpRefresher;

#[async_trait::async_trait]
impl SessionRefresher for HttpRefresher {
    async fn refresh(&self, http: &reqwest::Client, url: &Url) -> bool {
        match http.post(url.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(http_status = status.as_u16(), "refresh endpoint answered");
                status.is_success()
            }
            Err(e) => {
                warn!("Refresh request failed: {}", e);
                false
            }
        }
    }
}

/// Outcome of a refresh, shareable between every waiting request.
pub type RefreshOutcome = Shared<BoxFuture<'static, bool>>;

/// Whether the caller started the refresh or joined one already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRole {
    Leader,
    Joined,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    in_flight: Option<RefreshOutcome>,
}

/// Holds the at-most-one in-flight refresh.
#[derive(Clone, Default)]
pub struct RefreshGuard {
    slot: Arc<Mutex<Slot>>,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True while a refresh is outstanding.
    pub fn is_refreshing(&self) -> bool {
        Self::lock(&self.slot).in_flight.is_some()
    }

    /// Joins the outstanding refresh, or spawns `start()` as the new one.
    ///
    /// `start` is only invoked when the guard is idle. The slot is cleared by
    /// the refresh task itself once the refresh settles, whatever its result.
    /// Must be called from within a Tokio runtime.
    pub fn join_or_start<F, Fut>(&self, start: F) -> (RefreshOutcome, RefreshRole)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut slot = Self::lock(&self.slot);
        if let Some(outcome) = &slot.in_flight {
            return (outcome.clone(), RefreshRole::Joined);
        }

        slot.generation += 1;
        let generation = slot.generation;
        let refresh = start();
        let guard = Arc::clone(&self.slot);

        let task = tokio::spawn(async move {
            let renewed = refresh.await;
            let mut slot = Self::lock(&guard);
            if slot.generation == generation {
                slot.in_flight = None;
            }
            renewed
        });

        let outcome = task
            .map(|joined| match joined {
                Ok(renewed) => renewed,
                Err(e) => {
                    warn!("Refresh task did not complete: {}", e);
                    false
                }
            })
            .boxed()
            .shared();
        slot.in_flight = Some(outcome.clone());
        (outcome, RefreshRole::Leader)
    }
}
