// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step-up verification broker.
//!
//! When the server answers 403 with a step-up challenge, the original request
//! is parked as a [`PendingRequest`] and handed to the host's
//! [`StepUpHandler`]. The caller's future completes only when the host settles
//! the pending request, the step-up timeout elapses, or the host cancels all
//! parked requests. The broker itself never retries.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::SessionClient;
use crate::error::SessionError;
use crate::interceptor::STEP_UP_CODE;
use crate::request::{ApiRequest, ApiResponse};

/// Challenge carried in the `details` of a step-up 403.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpChallenge {
    pub step_up_required: bool,
    pub challenge_token: String,
    #[serde(default)]
    pub action: String,
}

impl StepUpChallenge {
    /// Parse `{code: "step_up_required", details: {step_up_required: true, challenge_token, action}}`.
    pub fn from_body(body: &Value) -> Option<Self> {
        if body.get("code").and_then(Value::as_str) != Some(STEP_UP_CODE) {
            return None;
        }
        let details = body.get("details")?;
        let challenge: Self = serde_json::from_value(details.clone()).ok()?;
        (challenge.step_up_required && !challenge.challenge_token.is_empty()).then_some(challenge)
    }
}

type Completion = Result<ApiResponse, SessionError>;

/// A request suspended behind a step-up challenge.
///
/// Settle it exactly once with [`resolve`](Self::resolve),
/// [`reject`](Self::reject) or [`replay`](Self::replay). Dropping it unsettled
/// rejects the parked call with [`SessionError::StepUpAbandoned`].
#[derive(Debug)]
pub struct PendingRequest {
    request: ApiRequest,
    completion: oneshot::Sender<Completion>,
}

impl PendingRequest {
    fn new(request: ApiRequest, completion: oneshot::Sender<Completion>) -> Self {
        Self { request, completion }
    }

    /// The original request as the caller issued it.
    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Whether the parked caller has stopped waiting (timeout or cancellation).
    pub fn is_closed(&self) -> bool {
        self.completion.is_closed()
    }

    pub fn resolve(self, response: ApiResponse) {
        self.settle(Ok(response));
    }

    pub fn reject(self, err: SessionError) {
        self.settle(Err(err));
    }

    /// Reject with a host-supplied reason.
    pub fn reject_with(self, reason: impl Into<String>) {
        self.settle(Err(SessionError::StepUpRejected(reason.into())));
    }

    /// Replay the original request once through `client` and settle with the
    /// outcome. `verification` is attached to the replay, typically the
    /// header carrying proof of the completed challenge.
    pub async fn replay(
        self,
        client: &SessionClient,
        verification: Option<(HeaderName, HeaderValue)>,
    ) -> Result<(), SessionError> {
        let mut request = self.request.clone();
        request.step_up_replayed = true;
        // A verified replay is a new attempt under the current session.
        request.auth_retried = false;
        request.bearer_override = None;
        if let Some((name, value)) = verification {
            request.headers.insert(name, value);
        }
        let result = client.execute(request).await;
        let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
        self.settle(result);
        outcome
    }

    fn settle(self, result: Completion) {
        if self.completion.send(result).is_err() {
            debug!(path = %self.request.path, "parked caller no longer waiting");
        }
    }
}

/// Host hook receiving step-up challenges.
pub trait StepUpHandler: Send + Sync {
    fn on_challenge(&self, challenge: StepUpChallenge, pending: PendingRequest);
}

impl<F> StepUpHandler for F
where
    F: Fn(StepUpChallenge, PendingRequest) + Send + Sync,
{
    fn on_challenge(&self, challenge: StepUpChallenge, pending: PendingRequest) {
        self(challenge, pending)
    }
}

/// Hand-off point between parked requests and the host's handler.
pub struct StepUpBroker {
    handler: RwLock<Option<Arc<dyn StepUpHandler>>>,
    timeout: Option<Duration>,
    cancel: Mutex<CancellationToken>,
}

impl StepUpBroker {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { handler: RwLock::new(None), timeout, cancel: Mutex::new(CancellationToken::new()) }
    }

    pub fn set_handler(&self, handler: Arc<dyn StepUpHandler>) {
        *self.handler.write() = Some(handler);
    }

    pub fn clear_handler(&self) {
        *self.handler.write() = None;
    }

    pub fn has_handler(&self) -> bool {
        self.handler.read().is_some()
    }

    /// Reject every currently parked request with [`SessionError::StepUpCancelled`].
    /// Requests parked afterwards are unaffected.
    pub fn cancel_pending(&self) {
        let previous = std::mem::replace(&mut *self.cancel.lock(), CancellationToken::new());
        previous.cancel();
    }

    /// Park `request` behind `challenge` until the host settles it.
    pub async fn park(&self, challenge: StepUpChallenge, request: ApiRequest) -> Completion {
        let handler = self.handler.read().clone();
        let Some(handler) = handler else {
            warn!(action = %challenge.action, "step-up required but no handler registered");
            return Err(SessionError::StepUpUnhandled(challenge));
        };

        let cancel = self.cancel.lock().clone();
        let (tx, rx) = oneshot::channel();
        info!(action = %challenge.action, path = %request.path, "request parked for step-up verification");
        handler.on_challenge(challenge, PendingRequest::new(request, tx));

        let settled = async { rx.await.unwrap_or(Err(SessionError::StepUpAbandoned)) };
        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, settled)
                    .await
                    .unwrap_or(Err(SessionError::StepUpTimedOut)),
                None => settled.await,
            }
        };

        let outcome = tokio::select! {
            result = bounded => result,
            () = cancel.cancelled() => Err(SessionError::StepUpCancelled),
        };
        if let Err(ref e) = outcome {
            warn!(err = %e, "parked request rejected");
        }
        outcome
    }
}

impl std::fmt::Debug for StepUpBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepUpBroker")
            .field("has_handler", &self.has_handler())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "step_up_tests.rs"]
mod tests;
