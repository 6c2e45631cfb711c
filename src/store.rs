//! Session store: single source of truth for the current session and token.
//!
//! DESIGN
//! ======
//! An explicit, constructed store shared by `Arc` between the HTTP client,
//! the refresh coordinator and the auth service. Every mutation replaces the
//! in-memory value and then persists the whole `{session, token}` document
//! under `auth-store` before returning.
//!
//! `set_token`/`clear_token` are the only writers of the durable login flag,
//! so the flag and the token cannot be updated independently.
//!
//! TRADE-OFFS
//! ==========
//! Last write wins; there is no merge. A failed durable write is logged and
//! the in-memory value is kept, so memory and disk may diverge until the next
//! successful write. Each clear and each login bumps an epoch so work that
//! started under an earlier session can detect it and drop its result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::login_flag::LoginFlag;
use crate::session::{AccessToken, Session};
use crate::storage::{KeyValueStorage, StorageError};

pub const AUTH_STORE_KEY: &str = "auth-store";
const AUTH_STORE_VERSION: u32 = 0;

// =============================================================================
// SNAPSHOT
// =============================================================================

/// The `{session, token}` pair as read together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSnapshot {
    pub session: Option<Session>,
    pub token: Option<AccessToken>,
}

#[derive(Serialize, Deserialize)]
struct PersistedAuth {
    state: AuthSnapshot,
    version: u32,
}

// =============================================================================
// STORE
// =============================================================================

pub struct SessionStore {
    state: RwLock<AuthSnapshot>,
    epoch: AtomicU64,
    storage: Arc<dyn KeyValueStorage>,
    flag: LoginFlag,
}

impl SessionStore {
    /// Create an empty store. Call [`SessionStore::init`] to hydrate.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>, flag: LoginFlag) -> Self {
        Self { state: RwLock::new(AuthSnapshot::default()), epoch: AtomicU64::new(0), storage, flag }
    }

    /// Hydrate from durable storage. A missing or unreadable document leaves
    /// the store empty.
    pub fn init(&self) {
        let restored = match self.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => AuthSnapshot::default(),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable auth store");
                AuthSnapshot::default()
            }
        };
        tracing::debug!(
            has_session = restored.session.is_some(),
            has_token = restored.token.is_some(),
            "auth store hydrated"
        );
        *self.write() = restored;
    }

    fn load(&self) -> Result<Option<AuthSnapshot>, StorageError> {
        let Some(raw) = self.storage.get(AUTH_STORE_KEY)? else {
            return Ok(None);
        };
        let persisted: PersistedAuth = serde_json::from_str(&raw)?;
        Ok(Some(persisted.state))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.read().session.clone()
    }

    #[must_use]
    pub fn token(&self) -> Option<AccessToken> {
        self.read().token.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.read().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().token.is_some()
    }

    /// Session generation. Bumped by every clear and by every login, so work
    /// that read it before either can tell its result belongs to an older
    /// session.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn login_flag(&self) -> &LoginFlag {
        &self.flag
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    pub fn set_session(&self, session: Session) {
        let mut state = self.write();
        state.session = Some(session);
        self.persist(&state);
    }

    pub fn clear_session(&self) {
        let mut state = self.write();
        state.session = None;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.persist(&state);
    }

    pub fn set_token(&self, token: AccessToken) {
        let mut state = self.write();
        state.token = Some(token);
        self.persist(&state);
        self.flag.set();
    }

    pub fn clear_token(&self) {
        let mut state = self.write();
        state.token = None;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.persist(&state);
        self.flag.clear();
    }

    /// Install the session and token of a fresh login as one write and start a
    /// new generation.
    pub fn start_session(&self, session: Session, token: AccessToken) {
        let mut state = self.write();
        state.session = Some(session);
        state.token = Some(token);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.persist(&state);
        self.flag.set();
    }

    /// Replace the token only if no clear or login happened since `epoch` was read.
    /// Returns `false` when the write was dropped.
    pub fn set_token_if_epoch(&self, epoch: u64, token: AccessToken) -> bool {
        let mut state = self.write();
        if self.epoch() != epoch {
            return false;
        }
        state.token = Some(token);
        self.persist(&state);
        self.flag.set();
        true
    }

    /// Clear session, token and login flag as a single write.
    pub fn clear(&self) {
        let mut state = self.write();
        *state = AuthSnapshot::default();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.persist(&state);
        self.flag.clear();
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn persist(&self, state: &AuthSnapshot) {
        let doc = PersistedAuth { state: state.clone(), version: AUTH_STORE_VERSION };
        let result = serde_json::to_string(&doc)
            .map_err(StorageError::from)
            .and_then(|raw| self.storage.set(AUTH_STORE_KEY, &raw));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist auth store");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthSnapshot> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuthSnapshot> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
