// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use bytes::Bytes;
use reqwest::StatusCode;
use serde_json::Value;

use crate::step_up::StepUpChallenge;

/// Maximum number of error body characters carried in an error message.
const MAX_ERROR_CHARS: usize = 200;

/// Errors surfaced by the session layer.
///
/// `Clone` so that one refresh outcome can be handed to every waiter of a
/// single-flight refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The server answered with a non-success status.
    Http { status: u16, message: String, body: Option<Value> },
    /// The request never produced a response (connect, timeout, reset).
    Transport(String),
    /// The response body could not be decoded into the requested shape.
    Decode(String),
    /// The request could not be built (bad URL, header name or value).
    InvalidRequest(String),
    /// The account must change its password before continuing.
    PasswordChangeRequired,
    /// A replayed request was challenged again.
    StepUpRequired(StepUpChallenge),
    /// A step-up challenge arrived but no handler is registered.
    StepUpUnhandled(StepUpChallenge),
    /// The host rejected a parked request.
    StepUpRejected(String),
    /// A parked request was not settled before the step-up timeout.
    StepUpTimedOut,
    /// Parked requests were cancelled by the host.
    StepUpCancelled,
    /// The pending request was dropped without being settled.
    StepUpAbandoned,
}

impl SessionError {
    /// Build an [`SessionError::Http`] from a raw response.
    pub fn from_response(status: StatusCode, body: &Bytes) -> Self {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let message = parsed
            .as_ref()
            .and_then(detail_text)
            .map(str::to_owned)
            .unwrap_or_else(|| sanitize_body(body, status));
        Self::Http { status: status.as_u16(), message, body: parsed }
    }

    /// HTTP status, when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Parsed JSON error body, when one was returned.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Whether this error is the server refusing the session (401/403),
    /// as opposed to a transient transport failure.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http { .. } => "HTTP",
            Self::Transport(_) => "TRANSPORT",
            Self::Decode(_) => "DECODE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::PasswordChangeRequired => "PASSWORD_CHANGE_REQUIRED",
            Self::StepUpRequired(_) => "STEP_UP_REQUIRED",
            Self::StepUpUnhandled(_) => "STEP_UP_UNHANDLED",
            Self::StepUpRejected(_) => "STEP_UP_REJECTED",
            Self::StepUpTimedOut => "STEP_UP_TIMED_OUT",
            Self::StepUpCancelled => "STEP_UP_CANCELLED",
            Self::StepUpAbandoned => "STEP_UP_ABANDONED",
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http { status, message, .. } => write!(f, "request failed ({status}): {message}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::PasswordChangeRequired => f.write_str("password change required"),
            Self::StepUpRequired(c) => {
                write!(f, "step-up verification required again for {}", c.action)
            }
            Self::StepUpUnhandled(c) => {
                write!(f, "step-up verification required for {} but no handler is registered", c.action)
            }
            Self::StepUpRejected(reason) => write!(f, "step-up verification rejected: {reason}"),
            Self::StepUpTimedOut => f.write_str("step-up verification timed out"),
            Self::StepUpCancelled => f.write_str("step-up verification cancelled"),
            Self::StepUpAbandoned => f.write_str("step-up verification abandoned"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Human-readable detail from an error body: `detail`, then `message`.
pub fn detail_text(body: &Value) -> Option<&str> {
    body.get("detail")
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

fn sanitize_body(body: &Bytes, status: StatusCode) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_owned()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
