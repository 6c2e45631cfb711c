//! Transport seam and the reqwest-backed implementation.
//!
//! The client and the refresh coordinator only see [`Transport`], so tests
//! swap in a scripted fake and never touch the network. The real transport
//! keeps a cookie jar: the refresh credential lives in an HTTP-only cookie
//! that the backend sets on login and reads on refresh.
//!
//! The jar cannot be enumerated, so the transport also keeps every
//! `Set-Cookie` header it receives next to the URL that answered. Replaying
//! those into a fresh jar restores cookies with their `Path`, `Domain` and
//! expiry intact, including a refresh cookie scoped to the refresh endpoint.
//! A relative `Max-Age` restarts from the moment of replay.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::SET_COOKIE;
use serde::{Deserialize, Serialize};

use super::types::{ApiRequest, ApiResponse, ClientError};
use crate::config::HttpTimeouts;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and buffer the whole response. Any status, including
    /// 4xx/5xx, is `Ok`; `Err` means no response was obtained.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError>;
}

// =============================================================================
// SAVED COOKIES
// =============================================================================

/// One `Set-Cookie` header as received, with the URL of the response that
/// carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCookie {
    pub url: String,
    pub set_cookie: String,
}

struct TrackedCookie {
    saved: SavedCookie,
    name: String,
    /// URL the cookie applies to: the response origin plus the cookie path.
    scope: Url,
}

/// Split a `Set-Cookie` value into its name and the path it applies to.
/// Without a `Path` attribute the path defaults to the directory of the
/// response URL.
fn cookie_name_and_path<'a>(set_cookie: &'a str, url: &Url) -> Option<(&'a str, String)> {
    let mut parts = set_cookie.split(';').map(str::trim);
    let (name, _) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let path = parts
        .filter_map(|attr| attr.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("path"))
        .map(|(_, value)| value.trim().to_owned())
        .filter(|path| path.starts_with('/'))
        .unwrap_or_else(|| match url.path().rfind('/') {
            Some(0) | None => "/".to_owned(),
            Some(end) => url.path()[..end].to_owned(),
        });
    Some((name, path))
}

// =============================================================================
// REQWEST
// =============================================================================

pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: Url,
    jar: Arc<Jar>,
    received: Mutex<BTreeMap<String, TrackedCookie>>,
}

impl ReqwestTransport {
    /// Build a transport rooted at `base_url` with the given timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HttpClientBuild`] if the URL is invalid or the
    /// reqwest client cannot be built.
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::HttpClientBuild(e.to_string()))?;
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .timeout(timeouts.request())
            .connect_timeout(timeouts.connect())
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| ClientError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url, jar, received: Mutex::new(BTreeMap::new()) })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request path against the base URL, keeping any base path
    /// prefix (`http://host/api` + `/startups` is `http://host/api/startups`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the joined URL does not parse.
    pub fn url_for(&self, path: &str) -> Result<Url, ClientError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if path.starts_with('/') { format!("{base}{path}") } else { format!("{base}/{path}") };
        Url::parse(&joined).map_err(|e| ClientError::Transport(format!("invalid url {joined}: {e}")))
    }

    /// Cookies the jar would send to the API base URL, as a `Cookie` header.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        self.cookies_for(&self.base_url)
    }

    /// Cookies the jar would send with a request to `path`.
    #[must_use]
    pub fn cookie_header_for(&self, path: &str) -> Option<String> {
        self.url_for(path).ok().and_then(|url| self.cookies_for(&url))
    }

    fn cookies_for(&self, url: &Url) -> Option<String> {
        self.jar
            .cookies(url)
            .and_then(|value| value.to_str().ok().map(ToOwned::to_owned))
    }

    /// The `Set-Cookie` headers behind every cookie the jar still holds.
    #[must_use]
    pub fn saved_cookies(&self) -> Vec<SavedCookie> {
        self.received_cookies()
            .values()
            .filter(|tracked| self.jar_holds(tracked))
            .map(|tracked| tracked.saved.clone())
            .collect()
    }

    /// Replay cookies returned by [`ReqwestTransport::saved_cookies`] into the jar.
    pub fn restore_saved_cookies(&self, cookies: &[SavedCookie]) {
        for cookie in cookies {
            match Url::parse(&cookie.url) {
                Ok(url) => {
                    self.jar.add_cookie_str(&cookie.set_cookie, &url);
                    self.remember_set_cookie(&url, &cookie.set_cookie);
                }
                Err(e) => tracing::warn!(url = %cookie.url, error = %e, "skipping saved cookie with invalid url"),
            }
        }
    }

    /// Track a `Set-Cookie` header the jar has already seen. A cookie the jar
    /// no longer holds afterwards (`Max-Age=0`, past `Expires`) is forgotten.
    pub(crate) fn remember_set_cookie(&self, url: &Url, set_cookie: &str) {
        let Some((name, path)) = cookie_name_and_path(set_cookie, url) else {
            return;
        };
        let mut scope = url.clone();
        scope.set_path(&path);
        scope.set_query(None);
        let key = format!("{}|{path}|{name}", url.host_str().unwrap_or_default());
        let tracked = TrackedCookie {
            saved: SavedCookie { url: url.to_string(), set_cookie: set_cookie.to_owned() },
            name: name.to_owned(),
            scope,
        };

        let mut received = self.received_cookies();
        if self.jar_holds(&tracked) {
            received.insert(key, tracked);
        } else {
            tracing::debug!(cookie = name, path = %path, "cookie removed by server");
            received.remove(&key);
        }
    }

    fn jar_holds(&self, tracked: &TrackedCookie) -> bool {
        self.cookies_for(&tracked.scope).is_some_and(|header| {
            header
                .split(';')
                .filter_map(|pair| pair.trim().split_once('='))
                .any(|(name, _)| name == tracked.name)
        })
    }

    fn received_cookies(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, TrackedCookie>> {
        self.received
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let url = self.url_for(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(method = %request.method, path = %request.path, error = %e, "request failed");
            ClientError::Transport(e.to_string())
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        for set_cookie in headers.get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok()) {
            self.remember_set_cookie(&url, set_cookie);
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        tracing::debug!(method = %request.method, path = %request.path, status = status.as_u16(), "response received");
        Ok(ApiResponse::new(status, headers, body.to_vec()))
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
