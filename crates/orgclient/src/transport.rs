// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One network round trip: decorate, send, capture CSRF, read the body.
//!
//! No recovery happens here; classification and retries live in the client.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::config::{HeaderNames, RouteKind, SessionConfig};
use crate::context::SessionContext;
use crate::error::SessionError;
use crate::interceptor::{capture_csrf, decorate};
use crate::request::{ApiRequest, ApiResponse, ResponseBody, ResponseKind};

/// Shared HTTP plumbing for the client and the refresh coordinator.
pub struct Transport {
    http: reqwest::Client,
    config: SessionConfig,
    ctx: SessionContext,
    names: HeaderNames,
    /// Bumped on every CSRF rotation.
    csrf_epoch: AtomicU64,
}

impl Transport {
    pub fn new(
        http: reqwest::Client,
        config: SessionConfig,
        ctx: SessionContext,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let names = config.header_names()?;
        Ok(Self { http, config, ctx, names, csrf_epoch: AtomicU64::new(0) })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn header_names(&self) -> &HeaderNames {
        &self.names
    }

    pub fn route_kind(&self, path: &str) -> RouteKind {
        self.config.route_kind(path)
    }

    /// Store a CSRF token issued by the server and record the rotation.
    pub fn store_csrf(&self, token: &str) {
        self.ctx.csrf.store_csrf_token(token);
        self.csrf_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Send `request` once. Non-success statuses are returned, not raised.
    pub async fn send(&self, request: &ApiRequest) -> Result<RawResponse, SessionError> {
        let route = self.route_kind(&request.path);
        let epoch = self.csrf_epoch.load(Ordering::SeqCst);
        let override_token = request.bearer_override.as_deref();
        let headers = decorate(&self.names, route, &self.ctx, &request.headers, override_token)?;
        let caller_auth = request.headers.contains_key(AUTHORIZATION) && override_token.is_none();
        let sent_bearer = if caller_auth {
            None
        } else {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_owned)
        };

        let url = self.config.url(&request.path);
        let mut builder = self.http.request(request.method.clone(), &url).headers(headers);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        // Captured on error responses too. An echo from an API response sent
        // before the latest rotation would roll the token back, so it is dropped.
        if route.is_auth_endpoint() || self.csrf_epoch.load(Ordering::SeqCst) == epoch {
            if capture_csrf(&self.names, &self.ctx, &headers).is_some() {
                self.csrf_epoch.fetch_add(1, Ordering::SeqCst);
            }
        } else if headers.contains_key(&self.names.csrf) {
            debug!(path = %request.path, "ignoring csrf echo that predates the latest rotation");
        }
        let body = resp.bytes().await?;
        debug!(method = %request.method, path = %request.path, status = status.as_u16(), "response received");

        Ok(RawResponse { status, headers, body, sent_bearer })
    }
}

/// Undecoded response from a single round trip.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Access token this layer attached to the request. `None` when no token
    /// was sent or the caller supplied its own Authorization header.
    pub sent_bearer: Option<String>,
}

impl RawResponse {
    /// Body parsed as JSON; `None` when empty or not JSON.
    pub fn json(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    pub fn to_error(&self) -> SessionError {
        SessionError::from_response(self.status, &self.body)
    }

    /// Successful payload for the caller. Binary bodies pass through
    /// untouched; JSON bodies are unwrapped from the envelope.
    pub fn into_api_response(self, kind: ResponseKind) -> ApiResponse {
        let body = match kind {
            ResponseKind::Binary => ResponseBody::Binary(self.body),
            ResponseKind::Json if self.body.is_empty() => ResponseBody::Json(Value::Null),
            ResponseKind::Json => match serde_json::from_slice::<Value>(&self.body) {
                Ok(value) => ResponseBody::Json(crate::envelope::unwrap(value)),
                Err(_) => match String::from_utf8(self.body.to_vec()) {
                    Ok(text) => ResponseBody::Json(Value::String(text)),
                    Err(_) => ResponseBody::Binary(self.body),
                },
            },
        };
        ApiResponse { status: self.status, headers: self.headers, body }
    }
}
