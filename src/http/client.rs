//! Authenticated client: attaches the bearer token and recovers from 401s.
//!
//! DESIGN
//! ======
//! Every request reads the token from the store at send time, never earlier,
//! so a request built before a refresh still goes out with the new token.
//! A 401 on a first attempt triggers one shared refresh and one replay; a
//! 401 on the replay is handed back to the caller as-is.
//!
//! A 401 for a request sent under a session that has since been cleared (or
//! replaced by a new login) is not refreshed: the pending request ends with
//! `SessionExpired(SessionCleared)` and the store is left as it is.
//!
//! No refresh is attempted while the user is in the unauthenticated area
//! (login, registration): a 401 there is the backend rejecting credentials,
//! not an expired session.
//!
//! TRADE-OFFS
//! ==========
//! When the token in the store already differs from the one a request was
//! sent with, another request refreshed it in the meantime; the replay uses
//! the current token and skips the refresh call. A replay always carries
//! the store's token, even if the caller set its own `Authorization` header.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::refresh::RefreshCoordinator;
use super::transport::Transport;
use super::types::{ApiRequest, ApiResponse, ClientError, RefreshError};
use crate::navigation::Navigation;
use crate::session::AccessToken;
use crate::store::SessionStore;

#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    store: Arc<SessionStore>,
    refresher: RefreshCoordinator,
    navigation: Navigation,
    auth_area_prefix: String,
    disposed: Arc<AtomicBool>,
}

impl AuthenticatedClient {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<SessionStore>,
        navigation: Navigation,
        refresh_endpoint: &str,
        auth_area_prefix: impl Into<String>,
    ) -> Self {
        let refresher = RefreshCoordinator::new(transport.clone(), store.clone(), refresh_endpoint);
        Self {
            transport,
            store,
            refresher,
            navigation,
            auth_area_prefix: auth_area_prefix.into(),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    #[must_use]
    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    /// Stop accepting requests. Clones share the flag. Requests already past
    /// their first send finish normally unless they need a replay.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            tracing::debug!("authenticated client disposed");
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------

    /// Send a request through the auth pipeline.
    ///
    /// Non-401 responses, including other 4xx/5xx, are returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Transport`] when no response was obtained.
    /// - [`ClientError::SessionExpired`] when the refresh failed (the store
    ///   has been cleared) or the session was cleared while the request was
    ///   pending. Either way the caller should go to the login route.
    /// - [`ClientError::Disposed`] after [`AuthenticatedClient::dispose`].
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ClientError> {
        self.ensure_live()?;
        let epoch = self.store.epoch();
        let attached = self.attach_token(&mut request)?;

        let response = self.transport.send(&request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        if request.is_retry() {
            tracing::debug!(path = %request.path, "replayed request still unauthorized");
            return Ok(response);
        }
        if self.navigation.is_within(&self.auth_area_prefix) {
            tracing::debug!(path = %request.path, "401 inside auth area; not refreshing");
            return Ok(response);
        }

        if self.store.epoch() != epoch {
            tracing::debug!(path = %request.path, "session changed while request was pending; not refreshing");
            return Err(ClientError::SessionExpired(RefreshError::SessionCleared));
        }

        request.mark_retried();
        let token = match (attached, self.store.token()) {
            (Some(sent), Some(current)) if sent != current => {
                tracing::debug!(path = %request.path, "token rotated since send; replaying without refresh");
                current
            }
            _ => self
                .refresher
                .refresh_for(epoch)
                .await
                .map_err(ClientError::SessionExpired)?,
        };

        self.ensure_live()?;
        request.set_bearer(&token)?;
        tracing::debug!(method = %request.method, path = %request.path, "replaying request with refreshed token");
        self.transport.send(&request).await
    }

    /// Attach the current token unless the caller set `Authorization`.
    /// Returns the token that was attached.
    fn attach_token(&self, request: &mut ApiRequest) -> Result<Option<AccessToken>, ClientError> {
        if request.has_authorization() {
            return Ok(None);
        }
        let Some(token) = self.store.token() else {
            return Ok(None);
        };
        request.set_bearer(&token)?;
        Ok(Some(token))
    }

    fn ensure_live(&self) -> Result<(), ClientError> {
        if self.is_disposed() { Err(ClientError::Disposed) } else { Ok(()) }
    }

    // -------------------------------------------------------------------------
    // Typed helpers
    // -------------------------------------------------------------------------

    /// `GET` and decode a JSON body.
    ///
    /// # Errors
    ///
    /// Same as [`AuthenticatedClient::send`], plus [`ClientError::Status`]
    /// for non-2xx and [`ClientError::Decode`] for a bad body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(ApiRequest::get(path)).await?.error_for_status()?.json()
    }

    /// `POST` a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedClient::get_json`].
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(path).json(body)?;
        self.send(request).await?.error_for_status()?.json()
    }

    /// `PUT` a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedClient::get_json`].
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::put(path).json(body)?;
        self.send(request).await?.error_for_status()?.json()
    }

    /// `DELETE` and return the raw response.
    ///
    /// # Errors
    ///
    /// Same as [`AuthenticatedClient::send`], plus [`ClientError::Status`] for non-2xx.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(ApiRequest::delete(path)).await?.error_for_status()
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
