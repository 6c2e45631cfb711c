//! Current navigation context.
//!
//! The UI (or the CLI) records where the user currently is; the HTTP client
//! reads it to decide whether a 401 is worth a refresh.

use std::sync::{Arc, RwLock};

use crate::config::path_has_prefix;

#[derive(Debug, Clone)]
pub struct Navigation {
    current: Arc<RwLock<String>>,
}

impl Navigation {
    #[must_use]
    pub fn new(initial: impl Into<String>) -> Self {
        Self { current: Arc::new(RwLock::new(initial.into())) }
    }

    pub fn navigate(&self, path: impl Into<String>) {
        let path = path.into();
        tracing::debug!(%path, "navigated");
        *self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = path;
    }

    #[must_use]
    pub fn current(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_within(&self, prefix: &str) -> bool {
        let current = self.current();
        let path = current.split(['?', '#']).next().unwrap_or_default();
        path_has_prefix(path, prefix)
    }
}

impl Default for Navigation {
    fn default() -> Self {
        Self::new("/")
    }
}
