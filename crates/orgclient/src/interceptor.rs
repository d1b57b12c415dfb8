// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request decoration and response classification.
//!
//! Everything here is synchronous and I/O free; the client drives it around
//! each network call.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::config::{HeaderNames, RouteKind};
use crate::context::SessionContext;
use crate::error::{detail_text, SessionError};
use crate::step_up::StepUpChallenge;

/// Body `code` that marks a step-up challenge.
pub const STEP_UP_CODE: &str = "step_up_required";

const PASSWORD_CHANGE_MARKER: &str = "password change required";

/// Compute the headers to send for a request to `route`.
///
/// Caller-set headers in `caller` win, except that `bearer_override` (the
/// token a refresh handed to a replay) replaces any Authorization header.
/// - Authorization: API routes only (never login, refresh or CSRF mint).
/// - Tenant: every route except login.
/// - CSRF: refresh only.
pub fn decorate(
    names: &HeaderNames,
    route: RouteKind,
    ctx: &SessionContext,
    caller: &HeaderMap,
    bearer_override: Option<&str>,
) -> Result<HeaderMap, SessionError> {
    let mut headers = caller.clone();

    if route == RouteKind::Api {
        if let Some(token) = bearer_override {
            headers.insert(AUTHORIZATION, bearer(token)?);
        } else if let Some(token) = ctx.credentials.access_token() {
            insert_absent(&mut headers, AUTHORIZATION, &bearer(&token)?);
        }
    }

    if route != RouteKind::Login {
        if let Some(tenant) = ctx.credentials.tenant_id().filter(|t| !t.is_empty()) {
            insert_absent(&mut headers, names.tenant.clone(), &header_value(&tenant)?);
        }
    }

    if route == RouteKind::Refresh {
        if let Some(csrf) = ctx.csrf.csrf_token().filter(|t| !t.is_empty()) {
            insert_absent(&mut headers, names.csrf.clone(), &header_value(&csrf)?);
        }
    }

    debug!(
        ?route,
        auth = headers.contains_key(AUTHORIZATION),
        tenant = headers.contains_key(&names.tenant),
        csrf = headers.contains_key(&names.csrf),
        "decorated request"
    );
    Ok(headers)
}

/// Store a CSRF token echoed in response headers. Returns the token when it
/// replaced the current one.
///
/// Last writer wins; callers must not feed it responses that were sent
/// before the most recent rotation (see [`crate::transport::Transport::send`]).
pub fn capture_csrf(
    names: &HeaderNames,
    ctx: &SessionContext,
    headers: &HeaderMap,
) -> Option<String> {
    let token = header_text(headers, &names.csrf)?;
    if ctx.csrf.csrf_token().as_deref() == Some(token.as_str()) {
        return None;
    }
    ctx.csrf.store_csrf_token(&token);
    debug!("rotated csrf token from response header");
    Some(token)
}

/// Recovery path for a failed response.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// Park the request until the host completes verification.
    StepUp(StepUpChallenge),
    /// Navigate to the password-change route and reject.
    PasswordChange,
    /// Refresh the session and replay once.
    Unauthorized,
    /// Reject with the original error.
    Other,
}

/// Classify a failed response, in precedence order: step-up, password
/// change, unauthorized, other.
///
/// `refresh_eligible` is false for requests that were already replayed once
/// and for the auth endpoints themselves.
pub fn classify(status: StatusCode, body: Option<&Value>, refresh_eligible: bool) -> Failure {
    if status == StatusCode::FORBIDDEN {
        if let Some(challenge) = body.and_then(StepUpChallenge::from_body) {
            return Failure::StepUp(challenge);
        }
        if body.is_some_and(is_password_change_required) {
            return Failure::PasswordChange;
        }
    }
    if status == StatusCode::UNAUTHORIZED && refresh_eligible {
        return Failure::Unauthorized;
    }
    Failure::Other
}

/// Whether an error body carries a password-change demand.
pub fn is_password_change_required(body: &Value) -> bool {
    detail_text(body).is_some_and(|d| d.to_lowercase().contains(PASSWORD_CHANGE_MARKER))
}

/// Whether a refresh failure was the server rejecting the CSRF token.
pub fn is_csrf_rejection(err: &SessionError) -> bool {
    let SessionError::Http { status: 403, message, body } = err else {
        return false;
    };
    let detail = body.as_ref().and_then(detail_text).unwrap_or(message.as_str());
    detail.to_lowercase().contains("csrf")
}

pub(crate) fn bearer(token: &str) -> Result<HeaderValue, SessionError> {
    let mut value = header_value(&format!("Bearer {token}"))?;
    value.set_sensitive(true);
    Ok(value)
}

pub(crate) fn header_text(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn header_value(value: &str) -> Result<HeaderValue, SessionError> {
    HeaderValue::from_str(value)
        .map_err(|e| SessionError::InvalidRequest(format!("invalid header value: {e}")))
}

fn insert_absent(headers: &mut HeaderMap, name: HeaderName, value: &HeaderValue) {
    if !headers.contains_key(&name) {
        headers.insert(name, value.clone());
    }
}

#[cfg(test)]
#[path = "interceptor_tests.rs"]
mod tests;
