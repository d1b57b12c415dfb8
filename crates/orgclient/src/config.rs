// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use reqwest::header::HeaderName;

use crate::error::SessionError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
pub const DEFAULT_CSRF_PATH: &str = "/auth/refresh/csrf";
pub const DEFAULT_PASSWORD_CHANGE_PATH: &str = "/change-password";
pub const DEFAULT_TENANT_HEADER: &str = "X-Org-Id";
pub const DEFAULT_CSRF_HEADER: &str = "X-CSRF-Token";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_STEP_UP_TIMEOUT_MS: u64 = 300_000;

/// Configuration for a session client.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL every request path is joined onto.
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "ORGCLIENT_BASE_URL")]
    pub base_url: String,

    /// Login endpoint (never receives session headers).
    #[arg(long, default_value = DEFAULT_LOGIN_PATH, env = "ORGCLIENT_LOGIN_PATH")]
    pub login_path: String,

    /// Token refresh endpoint.
    #[arg(long, default_value = DEFAULT_REFRESH_PATH, env = "ORGCLIENT_REFRESH_PATH")]
    pub refresh_path: String,

    /// CSRF mint endpoint used when refresh rejects the current CSRF token.
    #[arg(long, default_value = DEFAULT_CSRF_PATH, env = "ORGCLIENT_CSRF_PATH")]
    pub csrf_path: String,

    /// Route the host navigates to when the server demands a password change.
    #[arg(long, default_value = DEFAULT_PASSWORD_CHANGE_PATH, env = "ORGCLIENT_PASSWORD_CHANGE_PATH")]
    pub password_change_path: String,

    /// Header carrying the tenant id.
    #[arg(long, default_value = DEFAULT_TENANT_HEADER, env = "ORGCLIENT_TENANT_HEADER")]
    pub tenant_header: String,

    /// Header carrying the CSRF token, in both directions.
    #[arg(long, default_value = DEFAULT_CSRF_HEADER, env = "ORGCLIENT_CSRF_HEADER")]
    pub csrf_header: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_MS, env = "ORGCLIENT_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// How long a parked step-up request waits for the host, in milliseconds.
    /// Zero waits indefinitely.
    #[arg(long, default_value_t = DEFAULT_STEP_UP_TIMEOUT_MS, env = "ORGCLIENT_STEP_UP_TIMEOUT_MS")]
    pub step_up_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
            refresh_path: DEFAULT_REFRESH_PATH.to_owned(),
            csrf_path: DEFAULT_CSRF_PATH.to_owned(),
            password_change_path: DEFAULT_PASSWORD_CHANGE_PATH.to_owned(),
            tenant_header: DEFAULT_TENANT_HEADER.to_owned(),
            csrf_header: DEFAULT_CSRF_HEADER.to_owned(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            step_up_timeout_ms: DEFAULT_STEP_UP_TIMEOUT_MS,
        }
    }
}

/// Parsed header names for tenant and CSRF.
#[derive(Debug, Clone)]
pub struct HeaderNames {
    pub tenant: HeaderName,
    pub csrf: HeaderName,
}

/// Which auth endpoint, if any, a path addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Login,
    Refresh,
    CsrfMint,
    Api,
}

impl RouteKind {
    /// Auth endpoints are never recovered through a refresh.
    pub fn is_auth_endpoint(self) -> bool {
        !matches!(self, Self::Api)
    }
}

impl SessionConfig {
    /// Config pointing at `base_url` with every other field defaulted.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(SessionError::InvalidRequest("base url must not be empty".to_owned()));
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(SessionError::InvalidRequest(format!(
                "base url must be http(s): {base}"
            )));
        }
        self.header_names()?;
        Ok(())
    }

    pub fn header_names(&self) -> Result<HeaderNames, SessionError> {
        Ok(HeaderNames {
            tenant: parse_header_name(&self.tenant_header)?,
            csrf: parse_header_name(&self.csrf_header)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn step_up_timeout(&self) -> Option<Duration> {
        (self.step_up_timeout_ms > 0).then(|| Duration::from_millis(self.step_up_timeout_ms))
    }

    /// Join `path` onto the base URL. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim();
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        let base = self.base_url.trim().trim_end_matches('/');
        format!("{}/{}", base, path.trim_start_matches('/'))
    }

    /// Classify `path` against the configured auth endpoints.
    pub fn route_kind(&self, path: &str) -> RouteKind {
        let path = self.normalize_path(path);
        if path == self.normalize_path(&self.refresh_path) {
            RouteKind::Refresh
        } else if path == self.normalize_path(&self.csrf_path) {
            RouteKind::CsrfMint
        } else if path == self.normalize_path(&self.login_path) {
            RouteKind::Login
        } else {
            RouteKind::Api
        }
    }

    fn normalize_path<'a>(&self, path: &'a str) -> &'a str {
        let path = path.trim();
        let path = path.strip_prefix(self.base_url.trim().trim_end_matches('/')).unwrap_or(path);
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let path = path.trim_end_matches('/');
        path.strip_prefix('/').unwrap_or(path)
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName, SessionError> {
    HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| SessionError::InvalidRequest(format!("invalid header name {name:?}: {e}")))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
