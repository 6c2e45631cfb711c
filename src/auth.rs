//! Auth service: login, logout and profile fetch against the backend.
//!
//! Login and logout go straight to the transport. A 401 from either is an
//! answer about the credentials being presented, so neither may enter the
//! refresh path. Profile fetches are ordinary authenticated calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::AuthEndpoints;
use crate::http::{ApiRequest, AuthenticatedClient, ClientError, Transport};
use crate::session::{AccessToken, Session};
use crate::store::SessionStore;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(alias = "accessToken")]
    access_token: String,
    #[serde(flatten)]
    session: Session,
}

#[derive(Deserialize)]
struct MessageResponse {
    message: Option<String>,
}

// =============================================================================
// SERVICE
// =============================================================================

#[derive(Clone)]
pub struct AuthService {
    transport: Arc<dyn Transport>,
    client: AuthenticatedClient,
    endpoints: AuthEndpoints,
}

impl AuthService {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, client: AuthenticatedClient, endpoints: AuthEndpoints) -> Self {
        Self { transport, client, endpoints }
    }

    fn store(&self) -> &Arc<SessionStore> {
        self.client.store()
    }

    /// Exchange credentials for a session and access token.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Status`] when the backend rejects the credentials.
    /// - [`ClientError::Decode`] when the response lacks a session or token.
    /// - [`ClientError::Transport`] when the backend is unreachable.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        if self.client.is_disposed() {
            return Err(ClientError::Disposed);
        }
        let request = ApiRequest::post(&self.endpoints.login).json(&LoginRequest { email, password })?;
        let response = self.transport.send(&request).await?.error_for_status()?;
        let body: LoginResponse = response.json()?;

        let token = AccessToken::new(body.access_token);
        if token.is_empty() {
            return Err(ClientError::Decode("login response has an empty access_token".into()));
        }

        self.store().start_session(body.session.clone(), token);
        tracing::info!(user_id = %body.session.id, role = %body.session.role, "logged in");
        Ok(body.session)
    }

    /// End the session. Local state is cleared whatever the backend says;
    /// returns the backend's `message`, if any.
    pub async fn logout(&self) -> Option<String> {
        let message = match self.send_logout().await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "backend logout failed; clearing local session anyway");
                None
            }
        };
        self.store().clear();
        tracing::info!("logged out");
        message
    }

    async fn send_logout(&self) -> Result<Option<String>, ClientError> {
        let mut request = ApiRequest::delete(&self.endpoints.logout);
        if let Some(token) = self.store().token() {
            request = request.bearer(&token)?;
        }
        let response = self.transport.send(&request).await?.error_for_status()?;
        if response.body().is_empty() {
            return Ok(None);
        }
        Ok(response.json::<MessageResponse>()?.message)
    }

    /// Reload the current user's profile and replace the stored session.
    ///
    /// # Errors
    ///
    /// Same as [`AuthenticatedClient::get_json`]; `SessionExpired` means the
    /// store was cleared.
    pub async fn fetch_profile(&self) -> Result<Session, ClientError> {
        let session: Session = self.client.get_json(&self.endpoints.profile).await?;
        self.store().set_session(session.clone());
        Ok(session)
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
