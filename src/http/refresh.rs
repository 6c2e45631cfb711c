//! Refresh coordinator: at most one refresh request in flight.
//!
//! DESIGN
//! ======
//! The first caller to find the slot empty becomes the leader and spawns the
//! refresh as its own task; every caller, leader included, then waits on the
//! shared result. The spawned task survives cancellation of whichever caller
//! started it, so waiters are never left without an outcome.
//!
//! The store is updated exactly once per refresh, inside the spawned task:
//! the new token on success, a full clear on any failure. The slot is emptied
//! before the result is published, so a 401 arriving after completion starts
//! a fresh refresh instead of reusing a stale outcome.
//!
//! TRADE-OFFS
//! ==========
//! A transport failure during refresh is treated as terminal, same as a
//! rejection. The user is sent back to login even when the network blip was
//! transient. Each refresh carries the store epoch of the request that asked
//! for it. A logout or login that races the refresh moves the epoch on, the
//! token is dropped, and waiters see `SessionCleared`. A caller whose epoch
//! is already stale never reaches the network.

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::sync::{Notify, OnceCell};

use super::transport::Transport;
use super::types::{ApiRequest, ApiResponse, RefreshError};
use crate::session::AccessToken;
use crate::store::SessionStore;

type RefreshResult = Result<AccessToken, RefreshError>;

// =============================================================================
// IN-FLIGHT STATE
// =============================================================================

struct InFlightRefresh {
    /// Store generation the refresh was started for.
    epoch: u64,
    result: OnceCell<RefreshResult>,
    notify: Notify,
}

impl InFlightRefresh {
    fn new(epoch: u64) -> Self {
        Self { epoch, result: OnceCell::new(), notify: Notify::new() }
    }

    fn set_result(&self, result: RefreshResult) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> RefreshResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }
            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }
            notified.await;
        }
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

#[derive(Clone)]
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<SessionStore>,
    endpoint: String,
    in_flight: Arc<Mutex<Option<Arc<InFlightRefresh>>>>,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, store: Arc<SessionStore>, endpoint: impl Into<String>) -> Self {
        Self { transport, store, endpoint: endpoint.into(), in_flight: Arc::new(Mutex::new(None)) }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.slot().is_some()
    }

    /// Obtain a new access token, joining a refresh already in flight.
    ///
    /// On success the token has already been written to the store. On
    /// failure the store has already been cleared.
    ///
    /// # Errors
    ///
    /// Returns the shared [`RefreshError`] when the refresh fails or the
    /// session was cleared while it was running.
    pub async fn refresh(&self) -> Result<AccessToken, RefreshError> {
        self.refresh_for(self.store.epoch()).await
    }

    /// Same as [`RefreshCoordinator::refresh`] on behalf of work that started
    /// under store generation `epoch`. Nothing is sent once the store has
    /// moved past `epoch`.
    ///
    /// # Errors
    ///
    /// Returns [`RefreshError::SessionCleared`] when the store was cleared or
    /// a new login happened since `epoch`, otherwise as
    /// [`RefreshCoordinator::refresh`].
    pub async fn refresh_for(&self, epoch: u64) -> Result<AccessToken, RefreshError> {
        loop {
            if self.store.epoch() != epoch {
                tracing::debug!(epoch, "session changed; refresh skipped");
                return Err(RefreshError::SessionCleared);
            }
            let flight = self.join_or_start(epoch);
            let result = flight.wait().await;
            // A flight from an older generation always ends in SessionCleared;
            // it says nothing about the current session.
            if flight.epoch != epoch && matches!(result, Err(RefreshError::SessionCleared)) {
                continue;
            }
            return result;
        }
    }

    fn join_or_start(&self, epoch: u64) -> Arc<InFlightRefresh> {
        let mut slot = self.slot();
        if let Some(existing) = slot.as_ref() {
            tracing::debug!("joining in-flight refresh");
            return existing.clone();
        }
        let flight = Arc::new(InFlightRefresh::new(epoch));
        *slot = Some(flight.clone());
        let this = self.clone();
        let task_flight = flight.clone();
        tokio::spawn(async move {
            let result = this.run(epoch).await;
            this.finish(&task_flight, result);
        });
        flight
    }

    async fn run(&self, epoch: u64) -> RefreshResult {
        tracing::info!(endpoint = %self.endpoint, "refreshing access token");
        let outcome = match self.transport.send(&ApiRequest::get(&self.endpoint)).await {
            Ok(response) => parse_refresh_response(&response),
            Err(e) => Err(RefreshError::Transport(e.to_string())),
        };

        match outcome {
            Ok(token) => {
                if self.store.set_token_if_epoch(epoch, token.clone()) {
                    tracing::info!("access token refreshed");
                    Ok(token)
                } else {
                    tracing::warn!("session cleared during refresh; dropping new token");
                    Err(RefreshError::SessionCleared)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "refresh failed; clearing session");
                self.store.clear();
                Err(e)
            }
        }
    }

    fn finish(&self, flight: &Arc<InFlightRefresh>, result: RefreshResult) {
        {
            let mut slot = self.slot();
            if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, flight)) {
                *slot = None;
            }
        }
        flight.set_result(result);
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<InFlightRefresh>>> {
        self.in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// =============================================================================
// WIRE
// =============================================================================

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(alias = "accessToken")]
    access_token: String,
}

fn parse_refresh_response(response: &ApiResponse) -> RefreshResult {
    if !response.is_success() {
        return Err(RefreshError::Rejected { status: response.status().as_u16() });
    }
    let body: RefreshResponse = response
        .json()
        .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;
    let token = AccessToken::new(body.access_token);
    if token.is_empty() {
        return Err(RefreshError::MalformedResponse("empty access_token".into()));
    }
    Ok(token)
}

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;
