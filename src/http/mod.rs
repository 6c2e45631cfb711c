//! Authenticated HTTP pipeline.
//!
//! ARCHITECTURE
//! ============
//! `AuthenticatedClient` wraps a [`Transport`], reads the bearer token from
//! the `SessionStore` at send time, and on a 401 asks the
//! `RefreshCoordinator` for a new token before replaying once. The
//! coordinator owns the only path that writes a refreshed token.

mod client;
mod refresh;
mod transport;
mod types;

pub use client::AuthenticatedClient;
pub use refresh::RefreshCoordinator;
pub use transport::{ReqwestTransport, SavedCookie, Transport};
pub use types::{ApiRequest, ApiResponse, ClientError, RefreshError, RetryMarker};
