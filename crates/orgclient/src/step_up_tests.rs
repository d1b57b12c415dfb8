// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::json;

use super::*;
use crate::request::ResponseBody;

fn challenge() -> StepUpChallenge {
    StepUpChallenge {
        step_up_required: true,
        challenge_token: "ch-1".to_owned(),
        action: "approve_loan".to_owned(),
    }
}

fn ok_response(value: Value) -> ApiResponse {
    ApiResponse { status: StatusCode::OK, headers: HeaderMap::new(), body: ResponseBody::Json(value) }
}

type Slot = Arc<Mutex<Option<PendingRequest>>>;

/// Broker whose handler stashes the pending request for the test to settle.
fn stashing_broker(timeout: Option<Duration>) -> (Arc<StepUpBroker>, Slot) {
    let broker = Arc::new(StepUpBroker::new(timeout));
    let slot: Slot = Arc::new(Mutex::new(None));
    let stash = Arc::clone(&slot);
    broker.set_handler(Arc::new(move |_c: StepUpChallenge, pending: PendingRequest| {
        *stash.lock() = Some(pending);
    }));
    (broker, slot)
}

async fn wait_for_pending(slot: &Slot) -> PendingRequest {
    for _ in 0..200 {
        if let Some(pending) = slot.lock().take() {
            return pending;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("handler never received the pending request");
}

#[yare::parameterized(
    wrong_code     = { json!({"code": "forbidden", "details": {"step_up_required": true, "challenge_token": "x"}}) },
    no_details     = { json!({"code": "step_up_required"}) },
    flag_false     = { json!({"code": "step_up_required", "details": {"step_up_required": false, "challenge_token": "x"}}) },
    empty_token    = { json!({"code": "step_up_required", "details": {"step_up_required": true, "challenge_token": ""}}) },
    missing_token  = { json!({"code": "step_up_required", "details": {"step_up_required": true}}) },
    not_an_object  = { json!("step_up_required") },
)]
fn rejects_malformed_challenges(body: Value) {
    assert_eq!(StepUpChallenge::from_body(&body), None);
}

#[test]
fn parses_challenge_without_action() {
    let body = json!({
        "code": "step_up_required",
        "details": {"step_up_required": true, "challenge_token": "ch-9"}
    });
    let parsed = StepUpChallenge::from_body(&body);
    assert_eq!(parsed.as_ref().map(|c| c.challenge_token.as_str()), Some("ch-9"));
    assert_eq!(parsed.map(|c| c.action), Some(String::new()));
}

#[tokio::test]
async fn no_handler_rejects_immediately() {
    let broker = StepUpBroker::new(None);
    assert!(!broker.has_handler());
    let result = broker.park(challenge(), ApiRequest::get("/loans")).await;
    assert_eq!(result.err(), Some(SessionError::StepUpUnhandled(challenge())));
}

#[tokio::test]
async fn resolve_completes_the_parked_call() {
    let (broker, slot) = stashing_broker(None);
    let parked = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move { broker.park(challenge(), ApiRequest::post("/loans/7/approve")).await }
    });

    let pending = wait_for_pending(&slot).await;
    assert_eq!(pending.request().path, "/loans/7/approve");
    assert!(!pending.is_closed());
    pending.resolve(ok_response(json!({"approved": true})));

    let result = parked.await.unwrap_or_else(|e| panic!("join: {e}"));
    let value = result.ok().and_then(|r| r.json().cloned());
    assert_eq!(value, Some(json!({"approved": true})));
}

#[tokio::test]
async fn reject_with_reason() {
    let broker = Arc::new(StepUpBroker::new(None));
    broker.set_handler(Arc::new(|_c: StepUpChallenge, pending: PendingRequest| {
        pending.reject_with("user declined");
    }));
    let result = broker.park(challenge(), ApiRequest::get("/x")).await;
    assert_eq!(result.err(), Some(SessionError::StepUpRejected("user declined".to_owned())));
}

#[tokio::test]
async fn dropped_pending_is_abandoned() {
    let broker = StepUpBroker::new(None);
    broker.set_handler(Arc::new(|_c: StepUpChallenge, pending: PendingRequest| drop(pending)));
    let result = broker.park(challenge(), ApiRequest::get("/x")).await;
    assert_eq!(result.err(), Some(SessionError::StepUpAbandoned));
}

#[tokio::test]
async fn unsettled_request_times_out() {
    let (broker, slot) = stashing_broker(Some(Duration::from_millis(50)));
    let result = broker.park(challenge(), ApiRequest::get("/x")).await;
    assert_eq!(result.err(), Some(SessionError::StepUpTimedOut));

    let pending = slot.lock().take();
    assert!(pending.is_some_and(|p| p.is_closed()));
}

#[tokio::test]
async fn cancel_rejects_parked_requests_only() {
    let (broker, slot) = stashing_broker(None);
    let parked = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move { broker.park(challenge(), ApiRequest::get("/x")).await }
    });
    let first = wait_for_pending(&slot).await;

    broker.cancel_pending();
    let result = parked.await.unwrap_or_else(|e| panic!("join: {e}"));
    assert_eq!(result.err(), Some(SessionError::StepUpCancelled));
    assert!(first.is_closed());

    // Requests parked after the cancellation wait normally.
    let parked = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move { broker.park(challenge(), ApiRequest::get("/y")).await }
    });
    let second = wait_for_pending(&slot).await;
    second.resolve(ok_response(json!(1)));
    let result = parked.await.unwrap_or_else(|e| panic!("join: {e}"));
    assert!(result.is_ok());
}

#[test]
fn clear_handler() {
    let broker = StepUpBroker::new(None);
    broker.set_handler(Arc::new(|_c: StepUpChallenge, _p: PendingRequest| {}));
    assert!(broker.has_handler());
    broker.clear_handler();
    assert!(!broker.has_handler());
}
