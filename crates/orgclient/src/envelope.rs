// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform response envelope `{code, data, message}`.
//!
//! Bodies that do not match the envelope are treated as already unwrapped and
//! returned unchanged, so endpoints that skip the envelope need no special
//! casing at call sites.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;

/// Server response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: String,
    pub data: T,
    pub message: String,
}

/// Whether `value` structurally matches the envelope.
pub fn is_envelope(value: &Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    matches!(map.get("code"), Some(Value::String(_)))
        && matches!(map.get("message"), Some(Value::String(_)))
        && map.contains_key("data")
}

/// Return the envelope's `data`, or `value` unchanged when it is not an envelope.
pub fn unwrap(value: Value) -> Value {
    if !is_envelope(&value) {
        return value;
    }
    match value {
        Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

/// Unwrap, then deserialize the payload.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, SessionError> {
    serde_json::from_value(unwrap(value)).map_err(|e| SessionError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
