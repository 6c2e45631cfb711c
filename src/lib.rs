//! # incubator-console
//!
//! Authenticated request pipeline for the incubator management console:
//! session storage, bearer-token attachment with refresh-and-retry on 401,
//! single-flight token refresh, and the route guard for protected pages.
//!
//! ARCHITECTURE
//! ============
//! `ConsoleState` wires one `SessionStore` (backed by `KeyValueStorage`) into
//! the `AuthenticatedClient`, its `RefreshCoordinator`, the `AuthService` and
//! the `RouteGuard`. The guard reads only the durable login flag; everything
//! else reads the store.

pub mod auth;
pub mod config;
pub mod guard;
pub mod http;
pub mod login_flag;
pub mod navigation;
pub mod session;
pub mod state;
pub mod storage;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use auth::AuthService;
pub use config::{ConfigError, ConsoleConfig};
pub use guard::{GuardDecision, RouteGuard};
pub use http::{ApiRequest, ApiResponse, AuthenticatedClient, ClientError, RefreshCoordinator, RefreshError};
pub use navigation::Navigation;
pub use session::{AccessToken, Role, Session};
pub use state::{ConsoleState, StateError};
pub use store::SessionStore;
