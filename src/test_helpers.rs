//! Shared fixtures for unit tests: a canned session, a memory-backed store,
//! and a scripted [`Transport`] that records every call.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::http::{ApiRequest, ApiResponse, ClientError, RetryMarker, Transport};
use crate::login_flag::LoginFlag;
use crate::session::{Role, Session};
use crate::storage::MemoryStorage;
use crate::store::SessionStore;

pub(crate) fn admin_session() -> Session {
    Session {
        id: "1".into(),
        first_name: "Ada".into(),
        last_name: "Admin".into(),
        email: "admin@example.com".into(),
        role: Role::Admin,
    }
}

/// Store over fresh in-memory storage with a one hour login flag.
pub(crate) fn memory_store() -> Arc<SessionStore> {
    let storage = Arc::new(MemoryStorage::new());
    let flag = LoginFlag::new(storage.clone(), Duration::from_secs(3600));
    Arc::new(SessionStore::new(storage, flag))
}

// =============================================================================
// MOCK TRANSPORT
// =============================================================================

pub(crate) enum MockReply {
    Respond(ApiResponse),
    Delayed(Duration, ApiResponse),
    Fail(String),
}

pub(crate) fn json_reply(status: u16, value: serde_json::Value) -> MockReply {
    let status = StatusCode::from_u16(status).unwrap();
    MockReply::Respond(ApiResponse::from_json(status, &value))
}

pub(crate) fn delayed_json_reply(delay: Duration, status: u16, value: serde_json::Value) -> MockReply {
    let status = StatusCode::from_u16(status).unwrap();
    MockReply::Delayed(delay, ApiResponse::from_json(status, &value))
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: reqwest::Method,
    pub path: String,
    pub authorization: Option<String>,
    pub retry: RetryMarker,
}

type Handler = Box<dyn Fn(&ApiRequest) -> MockReply + Send + Sync>;

pub(crate) struct MockTransport {
    handler: Handler,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub(crate) fn new(handler: impl Fn(&ApiRequest) -> MockReply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { handler: Box::new(handler), calls: Mutex::new(Vec::new()) })
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method.clone(),
            path: request.path.clone(),
            authorization: request.authorization().map(ToOwned::to_owned),
            retry: request.retry_marker(),
        });
        match (self.handler)(request) {
            MockReply::Respond(response) => Ok(response),
            MockReply::Delayed(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            MockReply::Fail(message) => Err(ClientError::Transport(message)),
        }
    }
}
