// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::config::SessionConfig;
use crate::credential::{CsrfStore, MemoryCredentials};

fn names() -> HeaderNames {
    SessionConfig::default().header_names().unwrap_or_else(|e| panic!("header names: {e}"))
}

fn context(token: Option<&str>, tenant: Option<&str>, csrf: Option<&str>) -> SessionContext {
    let store = Arc::new(MemoryCredentials::new(token.map(Into::into), tenant.map(Into::into)));
    if let Some(csrf) = csrf {
        store.store_csrf_token(csrf);
    }
    SessionContext::in_memory(store)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[yare::parameterized(
    api      = { RouteKind::Api, true, true, false },
    login    = { RouteKind::Login, false, false, false },
    refresh  = { RouteKind::Refresh, false, true, true },
    csrf     = { RouteKind::CsrfMint, false, true, false },
)]
fn decorate_per_route(route: RouteKind, auth: bool, tenant: bool, csrf: bool) {
    let ctx = context(Some("T1"), Some("acme"), Some("C1"));
    let headers = decorate(&names(), route, &ctx, &HeaderMap::new(), None)
        .unwrap_or_else(|e| panic!("decorate failed: {e}"));

    assert_eq!(header(&headers, "authorization"), auth.then_some("Bearer T1"));
    assert_eq!(header(&headers, "x-org-id"), tenant.then_some("acme"));
    assert_eq!(header(&headers, "x-csrf-token"), csrf.then_some("C1"));
}

#[test]
fn decorate_without_credentials_adds_nothing() -> anyhow::Result<()> {
    let ctx = context(None, Some(""), None);
    let headers = decorate(&names(), RouteKind::Api, &ctx, &HeaderMap::new(), None)?;
    assert!(headers.is_empty());
    Ok(())
}

#[test]
fn caller_headers_win() -> anyhow::Result<()> {
    let ctx = context(Some("T1"), Some("acme"), None);
    let mut caller = HeaderMap::new();
    caller.insert(AUTHORIZATION, HeaderValue::from_static("Bearer mine"));
    caller.insert("x-org-id", HeaderValue::from_static("other"));

    let headers = decorate(&names(), RouteKind::Api, &ctx, &caller, None)?;
    assert_eq!(header(&headers, "authorization"), Some("Bearer mine"));
    assert_eq!(header(&headers, "x-org-id"), Some("other"));
    Ok(())
}

#[test]
fn refreshed_bearer_replaces_caller_and_stored_token() -> anyhow::Result<()> {
    let ctx = context(Some("T1"), None, None);
    let mut caller = HeaderMap::new();
    caller.insert(AUTHORIZATION, HeaderValue::from_static("Bearer mine"));

    let headers = decorate(&names(), RouteKind::Api, &ctx, &caller, Some("T2"))?;
    assert_eq!(header(&headers, "authorization"), Some("Bearer T2"));
    Ok(())
}

#[yare::parameterized(
    login   = { RouteKind::Login },
    refresh = { RouteKind::Refresh },
    csrf    = { RouteKind::CsrfMint },
)]
fn refreshed_bearer_never_reaches_auth_routes(route: RouteKind) {
    let ctx = context(Some("T1"), None, None);
    let headers = decorate(&names(), route, &ctx, &HeaderMap::new(), Some("T2"))
        .unwrap_or_else(|e| panic!("decorate failed: {e}"));
    assert_eq!(header(&headers, "authorization"), None);
}

#[test]
fn header_text_trims_and_skips_blank() {
    let mut headers = HeaderMap::new();
    let name = HeaderName::from_static("x-csrf-token");
    assert_eq!(header_text(&headers, &name), None);

    headers.insert(name.clone(), HeaderValue::from_static("   "));
    assert_eq!(header_text(&headers, &name), None);

    headers.insert(name.clone(), HeaderValue::from_static(" C7 "));
    assert_eq!(header_text(&headers, &name).as_deref(), Some("C7"));
}

#[test]
fn bearer_header_is_sensitive() -> anyhow::Result<()> {
    let ctx = context(Some("T1"), None, None);
    let headers = decorate(&names(), RouteKind::Api, &ctx, &HeaderMap::new(), None)?;
    assert!(headers.get(AUTHORIZATION).is_some_and(HeaderValue::is_sensitive));
    Ok(())
}

#[test]
fn invalid_token_is_rejected() {
    let ctx = context(Some("bad\ntoken"), None, None);
    let err = decorate(&names(), RouteKind::Api, &ctx, &HeaderMap::new(), None);
    assert!(matches!(err, Err(SessionError::InvalidRequest(_))));
}

#[test]
fn capture_csrf_rotates_only_on_change() {
    let ctx = context(None, None, Some("C1"));
    let mut headers = HeaderMap::new();

    assert_eq!(capture_csrf(&names(), &ctx, &headers), None);

    headers.insert("x-csrf-token", HeaderValue::from_static("C1"));
    assert_eq!(capture_csrf(&names(), &ctx, &headers), None);

    headers.insert("x-csrf-token", HeaderValue::from_static("C2"));
    assert_eq!(capture_csrf(&names(), &ctx, &headers).as_deref(), Some("C2"));
    assert_eq!(ctx.csrf.csrf_token().as_deref(), Some("C2"));
}

#[test]
fn capture_csrf_ignores_blank_values() {
    let ctx = context(None, None, Some("C1"));
    let mut headers = HeaderMap::new();
    headers.insert("x-csrf-token", HeaderValue::from_static("  "));
    assert_eq!(capture_csrf(&names(), &ctx, &headers), None);
    assert_eq!(ctx.csrf.csrf_token().as_deref(), Some("C1"));
}

fn step_up_body() -> Value {
    json!({
        "code": "step_up_required",
        "message": "verify",
        "details": {"step_up_required": true, "challenge_token": "ch-1", "action": "approve"}
    })
}

#[test]
fn classify_step_up() {
    let body = step_up_body();
    let failure = classify(StatusCode::FORBIDDEN, Some(&body), true);
    let Failure::StepUp(challenge) = failure else {
        panic!("expected step-up, got {failure:?}");
    };
    assert_eq!(challenge.challenge_token, "ch-1");
    assert_eq!(challenge.action, "approve");
}

#[yare::parameterized(
    password_change   = { 403, Some(json!({"detail": "Password change required"})), true, Failure::PasswordChange },
    password_message  = { 403, Some(json!({"message": "password change required before login"})), false, Failure::PasswordChange },
    plain_forbidden   = { 403, Some(json!({"detail": "nope"})), true, Failure::Other },
    forbidden_no_body = { 403, None, true, Failure::Other },
    unauthorized      = { 401, None, true, Failure::Unauthorized },
    already_retried   = { 401, None, false, Failure::Other },
    server_error      = { 500, Some(json!({"detail": "boom"})), true, Failure::Other },
    step_up_flag_off  = { 403, Some(json!({"code": "step_up_required", "details": {"step_up_required": false, "challenge_token": "x"}})), true, Failure::Other },
)]
fn classify_cases(status: u16, body: Option<Value>, eligible: bool, expected: Failure) {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::IM_A_TEAPOT);
    assert_eq!(classify(status, body.as_ref(), eligible), expected);
}

#[test]
fn step_up_wins_over_password_change() {
    let mut body = step_up_body();
    body["detail"] = json!("password change required");
    assert!(matches!(classify(StatusCode::FORBIDDEN, Some(&body), true), Failure::StepUp(_)));
}

#[yare::parameterized(
    detail_match   = { 403, Some(json!({"detail": "CSRF token invalid"})), "ignored", true },
    message_match  = { 403, None, "csrf mismatch", true },
    other_detail   = { 403, Some(json!({"detail": "forbidden"})), "csrf", false },
    wrong_status   = { 401, Some(json!({"detail": "csrf"})), "csrf", false },
)]
fn csrf_rejection(status: u16, body: Option<Value>, message: &str, expected: bool) {
    let err = SessionError::Http { status, message: message.to_owned(), body };
    assert_eq!(is_csrf_rejection(&err), expected);
}

#[test]
fn transport_errors_are_not_csrf_rejections() {
    assert!(!is_csrf_rejection(&SessionError::Transport("csrf".to_owned())));
}
