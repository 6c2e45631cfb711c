//! Route guard: synchronous allow/redirect decision for protected routes.
//!
//! DESIGN
//! ======
//! The guard consults only the durable login flag, never the token or the
//! network. It is optimistic: a present-but-stale flag lets the
//! navigation through, and the first API call on the page discovers the
//! expired session through the client's refresh path.

use crate::config::RouteConfig;
use crate::login_flag::LoginFlag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect { location: String },
}

impl GuardDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Clone)]
pub struct RouteGuard {
    flag: LoginFlag,
    routes: RouteConfig,
}

impl RouteGuard {
    #[must_use]
    pub fn new(flag: LoginFlag, routes: RouteConfig) -> Self {
        Self { flag, routes }
    }

    #[must_use]
    pub fn routes(&self) -> &RouteConfig {
        &self.routes
    }

    /// Decide whether a navigation to `path` may proceed.
    #[must_use]
    pub fn check(&self, path: &str) -> GuardDecision {
        if !self.routes.is_protected(path) {
            return GuardDecision::Allow;
        }
        if self.flag.is_set() {
            GuardDecision::Allow
        } else {
            tracing::debug!(%path, login = %self.routes.login_route, "unauthenticated navigation redirected");
            self.login_redirect()
        }
    }

    /// Redirect used for denied navigations and for terminal auth failures.
    #[must_use]
    pub fn login_redirect(&self) -> GuardDecision {
        GuardDecision::Redirect { location: self.routes.login_route.clone() }
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
