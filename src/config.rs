//! Console configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::login_flag::DEFAULT_LOGIN_FLAG_MAX_AGE_SECS;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_STATE_DIR: &str = ".incubator-console";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PROTECTED_PREFIX: &str = "/dashboard";
pub const DEFAULT_LOGIN_ROUTE: &str = "/auth/login";
pub const DEFAULT_AUTH_AREA_PREFIX: &str = "/auth";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Backend auth endpoint paths, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub login: String,
    pub refresh: String,
    pub logout: String,
    pub profile: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".into(),
            refresh: "/auth/refresh-token".into(),
            logout: "/auth/logout".into(),
            profile: "/auth/me".into(),
        }
    }
}

/// Console route layout used by the guard and by the client's 401 handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub protected_prefixes: Vec<String>,
    pub login_route: String,
    /// Unauthenticated area (login, registration). No refresh is attempted
    /// for requests made while navigated here.
    pub auth_area_prefix: String,
}

impl RouteConfig {
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        let path = strip_query(path);
        self.protected_prefixes
            .iter()
            .any(|prefix| path_has_prefix(path, prefix))
    }

    #[must_use]
    pub fn is_auth_area(&self, path: &str) -> bool {
        path_has_prefix(strip_query(path), &self.auth_area_prefix)
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            protected_prefixes: vec![DEFAULT_PROTECTED_PREFIX.into()],
            login_route: DEFAULT_LOGIN_ROUTE.into(),
            auth_area_prefix: DEFAULT_AUTH_AREA_PREFIX.into(),
        }
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Segment-aware prefix match: `/dashboard` matches `/dashboard` and
/// `/dashboard/startups`, not `/dashboards`.
pub(crate) fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

// =============================================================================
// CONSOLE CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub api_base_url: String,
    pub state_dir: PathBuf,
    pub timeouts: HttpTimeouts,
    pub login_flag_max_age_secs: u64,
    pub endpoints: AuthEndpoints,
    pub routes: RouteConfig,
}

impl ConsoleConfig {
    /// Build typed console config from environment variables.
    ///
    /// Optional:
    /// - `CONSOLE_API_BASE_URL`: default `http://127.0.0.1:8000`
    /// - `CONSOLE_STATE_DIR`: default `.incubator-console`
    /// - `CONSOLE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CONSOLE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `CONSOLE_LOGIN_FLAG_MAX_AGE_SECS`: default 86400
    /// - `CONSOLE_PROTECTED_PREFIXES`: comma separated, default `/dashboard`
    /// - `CONSOLE_LOGIN_ROUTE`: default `/auth/login`
    /// - `CONSOLE_AUTH_AREA_PREFIX`: default `/auth`
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the base URL or a numeric value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`ConsoleConfig::from_env`] with an explicit variable lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the base URL or a numeric value is invalid.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("CONSOLE_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        validate_base_url(&api_base_url)?;

        let state_dir = lookup("CONSOLE_STATE_DIR").map_or_else(|| PathBuf::from(DEFAULT_STATE_DIR), PathBuf::from);

        let timeouts = HttpTimeouts {
            request_secs: parse_u64(&lookup, "CONSOLE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: parse_u64(&lookup, "CONSOLE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };
        let login_flag_max_age_secs =
            parse_u64(&lookup, "CONSOLE_LOGIN_FLAG_MAX_AGE_SECS", DEFAULT_LOGIN_FLAG_MAX_AGE_SECS)?;

        let defaults = RouteConfig::default();
        let protected_prefixes = match lookup("CONSOLE_PROTECTED_PREFIXES") {
            Some(raw) => parse_prefixes(&raw)?,
            None => defaults.protected_prefixes,
        };
        let routes = RouteConfig {
            protected_prefixes,
            login_route: lookup("CONSOLE_LOGIN_ROUTE").unwrap_or(defaults.login_route),
            auth_area_prefix: lookup("CONSOLE_AUTH_AREA_PREFIX").unwrap_or(defaults.auth_area_prefix),
        };

        Ok(Self {
            api_base_url,
            state_dir,
            timeouts,
            login_flag_max_age_secs,
            endpoints: AuthEndpoints::default(),
            routes,
        })
    }

    #[must_use]
    pub fn login_flag_max_age(&self) -> Duration {
        Duration::from_secs(self.login_flag_max_age_secs)
    }
}

fn validate_base_url(raw: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ConfigError::InvalidBaseUrl { url: raw.to_owned(), reason: e.to_string() })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => {
            Err(ConfigError::InvalidBaseUrl { url: raw.to_owned(), reason: format!("unsupported scheme {other}") })
        }
    }
}

fn parse_u64<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) => Ok(value),
            Err(_) => Err(ConfigError::InvalidValue { key, value: raw }),
        },
    }
}

fn parse_prefixes(raw: &str) -> Result<Vec<String>, ConfigError> {
    let prefixes: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    if prefixes.is_empty() || prefixes.iter().any(|p| !p.starts_with('/')) {
        return Err(ConfigError::InvalidValue { key: "CONSOLE_PROTECTED_PREFIXES", value: raw.to_owned() });
    }
    Ok(prefixes)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
