//! Durable `isLoggedIn` marker read by the route guard.
//!
//! DESIGN
//! ======
//! Behaves like a short-lived cookie: the value `"true"` plus an absolute
//! expiry. The guard reads it synchronously from storage, never from the
//! in-memory session store, so a decision needs no hydration or network.
//! Only `SessionStore` writes it (see `store.rs`).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::storage::KeyValueStorage;

pub const LOGIN_FLAG_KEY: &str = "isLoggedIn";
pub const DEFAULT_LOGIN_FLAG_MAX_AGE_SECS: u64 = 86_400;

const FLAG_TRUE: &str = "true";

#[derive(Debug, Serialize, Deserialize)]
struct FlagRecord {
    value: String,
    /// Unix seconds.
    expires_at: i64,
}

#[derive(Clone)]
pub struct LoginFlag {
    storage: Arc<dyn KeyValueStorage>,
    max_age: Duration,
}

impl LoginFlag {
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>, max_age: Duration) -> Self {
        Self { storage, max_age }
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub(crate) fn set(&self) {
        self.set_at(OffsetDateTime::now_utc());
    }

    pub(crate) fn set_at(&self, now: OffsetDateTime) {
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        let record = FlagRecord {
            value: FLAG_TRUE.to_owned(),
            expires_at: now.unix_timestamp().saturating_add(max_age),
        };
        let result = serde_json::to_string(&record)
            .map_err(crate::storage::StorageError::from)
            .and_then(|doc| self.storage.set(LOGIN_FLAG_KEY, &doc));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist login flag");
        }
    }

    pub(crate) fn clear(&self) {
        if let Err(e) = self.storage.remove(LOGIN_FLAG_KEY) {
            tracing::warn!(error = %e, "failed to clear login flag");
        }
    }

    /// `true` while the flag holds `"true"` and has not expired.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.is_set_at(OffsetDateTime::now_utc())
    }

    #[must_use]
    pub fn is_set_at(&self, now: OffsetDateTime) -> bool {
        let raw = match self.storage.get(LOGIN_FLAG_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read login flag");
                return false;
            }
        };
        match serde_json::from_str::<FlagRecord>(&raw) {
            Ok(record) => record.value == FLAG_TRUE && now.unix_timestamp() < record.expires_at,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed login flag");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "login_flag_test.rs"]
mod tests;
