//! HTTP pipeline types: requests, responses and errors.
//!
//! Requests carry a path relative to the API base URL; the transport resolves
//! it. Responses are fully buffered so the client can inspect a 401 and still
//! hand any other response back to the caller untouched.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::session::AccessToken;

// =============================================================================
// ERRORS
// =============================================================================

/// Why a refresh did not produce a usable token. `Clone` so every coalesced
/// waiter receives the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// The refresh endpoint answered with a non-success status.
    #[error("refresh rejected with status {status}")]
    Rejected { status: u16 },

    /// The refresh request never produced a response.
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// The refresh endpoint answered 2xx without a usable token.
    #[error("refresh response malformed: {0}")]
    MalformedResponse(String),

    /// The session was cleared while the refresh was in flight.
    #[error("session was cleared during refresh")]
    SessionCleared,
}

/// Errors surfaced by the authenticated client and the auth service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network failure or timeout. Never triggers a refresh.
    #[error("request failed: {0}")]
    Transport(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// A header value could not be encoded.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// Non-success status surfaced by a typed helper.
    #[error("server returned status {status}")]
    Status { status: u16, body: String },

    /// A response body could not be decoded.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// Terminal authentication failure: the session has been cleared and the
    /// caller should send the user to the login route.
    #[error("session expired: {0}")]
    SessionExpired(#[source] RefreshError),

    /// The client was disposed.
    #[error("client disposed")]
    Disposed,
}

impl ClientError {
    /// `true` when the caller should redirect to login.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// Whether a request has already been replayed after a refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryMarker {
    #[default]
    Original,
    Retried,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, including any query string.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    retry: RetryMarker,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HeaderMap::new(), body: None, retry: RetryMarker::Original }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if `body` cannot be serialized.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set an explicit bearer token. The client will not override it on the
    /// first attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidHeader`] if the token is not a valid header value.
    pub fn bearer(mut self, token: &AccessToken) -> Result<Self, ClientError> {
        self.set_bearer(token)?;
        Ok(self)
    }

    pub(crate) fn set_bearer(&mut self, token: &AccessToken) -> Result<(), ClientError> {
        let mut value = HeaderValue::from_str(&token.bearer())?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    #[must_use]
    pub fn has_authorization(&self) -> bool {
        self.headers.contains_key(AUTHORIZATION)
    }

    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn retry_marker(&self) -> RetryMarker {
        self.retry
    }

    #[must_use]
    pub fn is_retry(&self) -> bool {
        self.retry == RetryMarker::Retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retry = RetryMarker::Retried;
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    /// Build a JSON response. Mostly useful for tests and fakes.
    #[must_use]
    pub fn from_json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self { status, headers, body: value.to_string().into_bytes() }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Turn a non-2xx response into [`ClientError::Status`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Status`] with the status code and body text.
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::Status { status: self.status.as_u16(), body: self.text() })
        }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
