//! Shared console state.
//!
//! DESIGN
//! ======
//! `ConsoleState` is built once per process from a `ConsoleConfig` and then
//! cloned wherever it is needed. One durable storage, one session store, one
//! transport (and therefore one cookie jar), one refresh coordinator. Every
//! clone shares them through `Arc`.

use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::ConsoleConfig;
use crate::guard::RouteGuard;
use crate::http::{AuthenticatedClient, ClientError, ReqwestTransport, SavedCookie, Transport};
use crate::login_flag::LoginFlag;
use crate::navigation::Navigation;
use crate::storage::{FileStorage, KeyValueStorage, StorageError};
use crate::store::SessionStore;

/// Storage key for the cookies received from the API, kept between CLI runs.
pub const COOKIES_KEY: &str = "cookies";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Clone)]
pub struct ConsoleState {
    pub config: Arc<ConsoleConfig>,
    pub storage: Arc<dyn KeyValueStorage>,
    pub store: Arc<SessionStore>,
    pub navigation: Navigation,
    pub transport: Arc<ReqwestTransport>,
    pub client: AuthenticatedClient,
    pub guard: RouteGuard,
    pub auth: AuthService,
}

impl ConsoleState {
    /// Open file storage under `config.state_dir` and wire everything up.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the state directory cannot be created or
    /// the HTTP client cannot be built.
    pub fn from_config(config: ConsoleConfig) -> Result<Self, StateError> {
        let storage = Arc::new(FileStorage::open(&config.state_dir)?);
        Ok(Self::with_storage(config, storage)?)
    }

    /// Wire everything up over an explicit storage backend.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn with_storage(config: ConsoleConfig, storage: Arc<dyn KeyValueStorage>) -> Result<Self, ClientError> {
        let flag = LoginFlag::new(storage.clone(), config.login_flag_max_age());
        let store = Arc::new(SessionStore::new(storage.clone(), flag.clone()));
        store.init();

        let navigation = Navigation::default();
        let transport = Arc::new(ReqwestTransport::new(&config.api_base_url, config.timeouts)?);
        let dyn_transport: Arc<dyn Transport> = transport.clone();
        let client = AuthenticatedClient::new(
            dyn_transport.clone(),
            store.clone(),
            navigation.clone(),
            &config.endpoints.refresh,
            config.routes.auth_area_prefix.clone(),
        );
        let guard = RouteGuard::new(flag, config.routes.clone());
        let auth = AuthService::new(dyn_transport, client.clone(), config.endpoints.clone());

        tracing::debug!(api = %config.api_base_url, authenticated = store.is_authenticated(), "console state ready");
        Ok(Self { config: Arc::new(config), storage, store, navigation, transport, client, guard, auth })
    }

    /// Reload the cookies saved by [`ConsoleState::save_cookies`].
    pub fn restore_cookies(&self) {
        match self.storage.get(COOKIES_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<SavedCookie>>(&raw) {
                Ok(cookies) => self.transport.restore_saved_cookies(&cookies),
                Err(e) => tracing::warn!(error = %e, "discarding unreadable cookie store"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read cookie store"),
        }
    }

    /// Persist every cookie the API has set and not yet expired, or remove
    /// the entry when there are none.
    pub fn save_cookies(&self) {
        let cookies = self.transport.saved_cookies();
        let result = if cookies.is_empty() {
            self.storage.remove(COOKIES_KEY)
        } else {
            serde_json::to_string(&cookies)
                .map_err(StorageError::from)
                .and_then(|raw| self.storage.set(COOKIES_KEY, &raw))
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist cookies");
        }
    }

    /// Remove the saved cookies.
    pub fn forget_cookies(&self) {
        if let Err(e) = self.storage.remove(COOKIES_KEY) {
            tracing::warn!(error = %e, "failed to remove cookie store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AccessToken;
    use crate::storage::MemoryStorage;

    fn config() -> ConsoleConfig {
        ConsoleConfig::from_vars(|_: &str| None).unwrap()
    }

    #[test]
    fn store_and_guard_share_the_flag() {
        let state = ConsoleState::with_storage(config(), Arc::new(MemoryStorage::new())).unwrap();
        assert!(!state.guard.check("/dashboard").is_allowed());
        state.store.set_token(AccessToken::new("t1"));
        assert!(state.guard.check("/dashboard").is_allowed());
    }

    #[test]
    fn hydrates_from_existing_storage() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        {
            let state = ConsoleState::with_storage(config(), storage.clone()).unwrap();
            state.store.set_token(AccessToken::new("persisted"));
        }
        let state = ConsoleState::with_storage(config(), storage).unwrap();
        assert_eq!(state.store.token(), Some(AccessToken::new("persisted")));
        assert!(state.guard.check("/dashboard/startups").is_allowed());
    }

    #[test]
    fn cookies_survive_a_restart() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let first = ConsoleState::with_storage(config(), storage.clone()).unwrap();
        first.transport.restore_saved_cookies(&[SavedCookie {
            url: "http://127.0.0.1:8000/auth/login".into(),
            set_cookie: "refresh_token=r1; Path=/auth/refresh-token; HttpOnly".into(),
        }]);
        first.save_cookies();

        let second = ConsoleState::with_storage(config(), storage.clone()).unwrap();
        assert_eq!(second.transport.cookie_header_for("/auth/refresh-token"), None);
        second.restore_cookies();
        assert_eq!(second.transport.cookie_header_for("/auth/refresh-token").as_deref(), Some("refresh_token=r1"));
        assert_eq!(second.transport.cookie_header(), None);

        second.forget_cookies();
        assert_eq!(storage.get(COOKIES_KEY).unwrap(), None);
    }

    #[test]
    fn from_config_creates_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.state_dir = dir.path().join("nested");
        let state = ConsoleState::from_config(config).unwrap();
        state.store.set_token(AccessToken::new("t1"));
        assert!(dir.path().join("nested").join("auth-store.json").exists());
    }
}
