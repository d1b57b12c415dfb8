// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request descriptors and decoded responses.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::SessionError;

/// How the caller wants the response body delivered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// JSON, unwrapped from the envelope.
    #[default]
    Json,
    /// Raw bytes (downloads, exports), never unwrapped.
    Binary,
}

/// A replayable outgoing call.
///
/// Headers hold only what the caller set explicitly; session headers are
/// computed at send time so a replay always sees current credentials.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub response_kind: ResponseKind,
    pub(crate) auth_retried: bool,
    pub(crate) step_up_replayed: bool,
    /// Token a refresh replay must carry, applied at send time.
    pub(crate) bearer_override: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            response_kind: ResponseKind::Json,
            auth_retried: false,
            step_up_replayed: false,
            bearer_override: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Serialize `body` as JSON. Sets `Content-Type` unless the caller already did.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, SessionError> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| SessionError::InvalidRequest(format!("failed to encode body: {e}")))?;
        self.headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn binary(mut self) -> Self {
        self.response_kind = ResponseKind::Binary;
        self
    }

    /// Whether this request was already replayed after a refresh.
    pub fn is_auth_retried(&self) -> bool {
        self.auth_retried
    }

    /// Whether this request is a replay after step-up verification.
    pub fn is_step_up_replay(&self) -> bool {
        self.step_up_replayed
    }
}

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Binary(Bytes),
}

/// A successful response after envelope unwrapping.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn json(&self) -> Option<&Value> {
        match self.body {
            ResponseBody::Json(ref value) => Some(value),
            ResponseBody::Binary(_) => None,
        }
    }

    pub fn into_json(self) -> Result<Value, SessionError> {
        match self.body {
            ResponseBody::Json(value) => Ok(value),
            ResponseBody::Binary(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SessionError::Decode(format!("binary body is not json: {e}"))),
        }
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T, SessionError> {
        serde_json::from_value(self.into_json()?).map_err(|e| SessionError::Decode(e.to_string()))
    }

    pub fn into_bytes(self) -> Bytes {
        match self.body {
            ResponseBody::Binary(bytes) => bytes,
            ResponseBody::Json(value) => Bytes::from(value.to_string()),
        }
    }
}
