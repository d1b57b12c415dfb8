// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session-aware HTTP client.
//!
//! Every call runs through [`SessionClient::execute`], which decorates the
//! request, classifies failures, and applies at most one recovery: a
//! single-flight refresh followed by one replay for 401s, a step-up park for
//! challenged 403s, or a navigation for password-change demands.

use std::sync::{Arc, Once};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::context::SessionContext;
use crate::credential::TokenPair;
use crate::error::SessionError;
use crate::interceptor::{classify, Failure};
use crate::refresh::{self, RefreshCoordinator, RefreshKey};
use crate::request::{ApiRequest, ApiResponse};
use crate::step_up::{StepUpBroker, StepUpHandler};
use crate::transport::{RawResponse, Transport};

static CRYPTO_INIT: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

struct Inner {
    transport: Arc<Transport>,
    refresh: RefreshCoordinator,
    step_up: StepUpBroker,
}

/// Cheaply cloneable handle; clones share credentials, refresh flights and
/// the step-up broker.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl SessionClient {
    pub fn new(config: SessionConfig, ctx: SessionContext) -> Result<Self, SessionError> {
        ensure_crypto_provider();
        let http = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        Self::with_http(http, config, ctx)
    }

    /// Build on an existing `reqwest::Client`.
    pub fn with_http(
        http: reqwest::Client,
        config: SessionConfig,
        ctx: SessionContext,
    ) -> Result<Self, SessionError> {
        let step_up = StepUpBroker::new(config.step_up_timeout());
        let transport = Arc::new(Transport::new(http, config, ctx)?);
        let refresh = RefreshCoordinator::new(Arc::clone(&transport));
        Ok(Self { inner: Arc::new(Inner { transport, refresh, step_up }) })
    }

    pub fn config(&self) -> &SessionConfig {
        self.inner.transport.config()
    }

    pub fn context(&self) -> &SessionContext {
        self.inner.transport.context()
    }

    pub fn set_step_up_handler<H: StepUpHandler + 'static>(&self, handler: H) {
        self.inner.step_up.set_handler(Arc::new(handler));
    }

    pub fn clear_step_up_handler(&self) {
        self.inner.step_up.clear_handler();
    }

    /// Reject every request currently parked behind a step-up challenge.
    pub fn cancel_pending_step_ups(&self) {
        self.inner.step_up.cancel_pending();
    }

    /// Send `request`, applying session recovery.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let span = tracing::info_span!(
            "api_request",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
        );
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(&self, mut request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let transport = &self.inner.transport;
        loop {
            let resp = transport.send(&request).await?;
            if resp.status.is_success() {
                return Ok(resp.into_api_response(request.response_kind));
            }

            let route = transport.route_kind(&request.path);
            let eligible = !request.auth_retried && !route.is_auth_endpoint();
            let body = resp.json();
            match classify(resp.status, body.as_ref(), eligible) {
                Failure::StepUp(challenge) => {
                    if request.step_up_replayed {
                        return Err(SessionError::StepUpRequired(challenge));
                    }
                    return self.inner.step_up.park(challenge, request).await;
                }
                Failure::PasswordChange => {
                    self.redirect_to_password_change();
                    return Err(SessionError::PasswordChangeRequired);
                }
                Failure::Unauthorized => {
                    let token = self.recover_token(&resp).await?;
                    request.auth_retried = true;
                    request.bearer_override = Some(token);
                    debug!("replaying request with refreshed token");
                }
                Failure::Other => return Err(resp.to_error()),
            }
        }
    }

    /// Token to replay a 401 with. When the token this layer attached was
    /// already superseded, the current one is used instead of refreshing
    /// again. Caller-supplied Authorization headers always refresh.
    async fn recover_token(&self, resp: &RawResponse) -> Result<String, SessionError> {
        let ctx = self.context();
        if let Some(sent) = resp.sent_bearer.as_deref() {
            if let Some(current) = ctx.credentials.access_token().filter(|c| c != sent) {
                debug!("401 for a superseded token, replaying without refresh");
                return Ok(current);
            }
        }
        let key = RefreshKey::from_tenant(ctx.credentials.tenant_id().as_deref());
        match self.inner.refresh.refresh(key).await {
            Ok(pair) => Ok(pair.access_token),
            Err(_) => Err(resp.to_error()),
        }
    }

    fn redirect_to_password_change(&self) {
        let target = &self.config().password_change_path;
        let hooks = &self.context().hooks;
        if hooks.current_path().as_deref() == Some(target.as_str()) {
            return;
        }
        info!(path = %target, "password change required, redirecting");
        hooks.navigate(target);
    }

    /// Refresh the session for the current tenant, sharing any in-flight refresh.
    pub async fn refresh_session(&self) -> Result<TokenPair, SessionError> {
        let key = RefreshKey::from_tenant(self.context().credentials.tenant_id().as_deref());
        self.inner.refresh.refresh(key).await
    }

    /// Mint a fresh CSRF token and store it.
    pub async fn mint_csrf(&self) -> Result<String, SessionError> {
        refresh::mint_csrf(&self.inner.transport).await
    }

    /// Post `credentials` to the login endpoint and install the issued tokens.
    pub async fn login<B: Serialize + ?Sized>(
        &self,
        credentials: &B,
    ) -> Result<TokenPair, SessionError> {
        let request = ApiRequest::post(self.config().login_path.clone()).json(credentials)?;
        let pair: TokenPair = self.execute(request).await?.decode()?;
        if let Some(csrf) = pair.csrf_token.as_deref().filter(|t| !t.is_empty()) {
            self.inner.transport.store_csrf(csrf);
        }
        self.context().updater.update(&pair);
        info!("logged in");
        Ok(pair)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        self.execute(ApiRequest::get(path)).await?.decode()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(ApiRequest::post(path).json(body)?).await?.decode()
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(ApiRequest::put(path).json(body)?).await?.decode()
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(ApiRequest::patch(path).json(body)?).await?.decode()
    }

    pub async fn delete(&self, path: &str) -> Result<Value, SessionError> {
        self.execute(ApiRequest::delete(path)).await?.into_json()
    }

    /// Fetch raw bytes, bypassing envelope unwrapping.
    pub async fn download(&self, path: &str) -> Result<Bytes, SessionError> {
        Ok(self.execute(ApiRequest::get(path).binary()).await?.into_bytes())
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.config().base_url)
            .field("step_up", &self.inner.step_up)
            .finish_non_exhaustive()
    }
}
