// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight session refresh with CSRF self-healing.
//!
//! For a given [`RefreshKey`] at most one refresh is in flight. Concurrent
//! callers join the flight and observe the same outcome. The map entry is
//! removed by a drop guard owned by the flight itself, so the next caller
//! after completion starts a fresh attempt.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn, Instrument};

use crate::credential::TokenPair;
use crate::envelope;
use crate::error::SessionError;
use crate::interceptor::{header_text, is_csrf_rejection};
use crate::request::ApiRequest;
use crate::transport::{RawResponse, Transport};

/// Tenant scope of a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefreshKey {
    Tenant(String),
    Default,
}

impl RefreshKey {
    pub fn from_tenant(tenant: Option<&str>) -> Self {
        match tenant.map(str::trim) {
            Some(id) if !id.is_empty() => Self::Tenant(id.to_owned()),
            _ => Self::Default,
        }
    }
}

impl fmt::Display for RefreshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant(id) => write!(f, "org:{id}"),
            Self::Default => f.write_str("org:default"),
        }
    }
}

type FlightOutcome = Result<TokenPair, SessionError>;
type FlightFuture = Shared<BoxFuture<'static, FlightOutcome>>;
type FlightMap = Arc<Mutex<HashMap<RefreshKey, Flight>>>;

struct Flight {
    generation: u64,
    future: FlightFuture,
}

/// Removes its flight from the map when the flight finishes or is dropped.
struct FlightGuard {
    flights: FlightMap,
    key: RefreshKey,
    generation: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let removed = {
            let mut flights = self.flights.lock();
            match flights.get(&self.key) {
                Some(flight) if flight.generation == self.generation => flights.remove(&self.key),
                _ => None,
            }
        };
        drop(removed);
    }
}

/// Deduplicates refreshes per tenant.
pub struct RefreshCoordinator {
    transport: Arc<Transport>,
    flights: FlightMap,
    generation: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport, flights: Arc::new(Mutex::new(HashMap::new())), generation: AtomicU64::new(0) }
    }

    /// Whether a refresh for `key` is currently in flight.
    pub fn is_refreshing(&self, key: &RefreshKey) -> bool {
        self.flights.lock().contains_key(key)
    }

    /// Refresh the session for `key`, joining an in-flight refresh if one exists.
    pub async fn refresh(&self, key: RefreshKey) -> FlightOutcome {
        let future = {
            let mut flights = self.flights.lock();
            match flights.get(&key) {
                Some(flight) => {
                    debug!(%key, "joining in-flight refresh");
                    flight.future.clone()
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let future = self.start_flight(key.clone(), generation);
                    flights.insert(key, Flight { generation, future: future.clone() });
                    future
                }
            }
        };
        future.await
    }

    fn start_flight(&self, key: RefreshKey, generation: u64) -> FlightFuture {
        let guard = FlightGuard { flights: Arc::clone(&self.flights), key: key.clone(), generation };
        let transport = Arc::clone(&self.transport);
        let span = tracing::info_span!("session_refresh", %key);
        async move {
            let _guard = guard;
            run_flight(&transport, &key).await
        }
        .instrument(span)
        .boxed()
        .shared()
    }
}

async fn run_flight(transport: &Transport, key: &RefreshKey) -> FlightOutcome {
    let ctx = transport.context();
    let had_token = ctx.credentials.access_token().is_some();

    let result = refresh_with_csrf_retry(transport).await;
    match result {
        Ok(ref pair) => {
            ctx.updater.update(pair);
            info!(%key, "session refreshed");
        }
        Err(ref e) => {
            warn!(%key, err = %e, "session refresh failed");
            if had_token && e.is_auth_failure() {
                ctx.hooks.on_unauthorized();
            }
        }
    }
    result
}

/// One refresh attempt, healed at most once by minting a new CSRF token.
async fn refresh_with_csrf_retry(transport: &Transport) -> FlightOutcome {
    match post_refresh(transport).await {
        Err(ref e) if is_csrf_rejection(e) => {
            debug!("refresh rejected the csrf token, minting a new one");
            mint_csrf(transport).await?;
            post_refresh(transport).await
        }
        other => other,
    }
}

async fn post_refresh(transport: &Transport) -> FlightOutcome {
    let path = transport.config().refresh_path.clone();
    let resp = transport.send(&ApiRequest::post(path)).await?;
    if !resp.status.is_success() {
        return Err(resp.to_error());
    }
    let pair: TokenPair = envelope::decode(json_body(&resp)?)?;
    if let Some(csrf) = pair.csrf_token.as_deref().filter(|t| !t.is_empty()) {
        transport.store_csrf(csrf);
    }
    Ok(pair)
}

#[derive(Debug, Deserialize)]
struct CsrfMintResponse {
    #[serde(default)]
    csrf_token: Option<String>,
}

/// Mint and store a fresh CSRF token.
///
/// The token must come from the mint response itself, body first, then the
/// echoed header. The stored token is never reused.
pub async fn mint_csrf(transport: &Transport) -> Result<String, SessionError> {
    let path = transport.config().csrf_path.clone();
    let resp = transport.send(&ApiRequest::post(path)).await?;
    if !resp.status.is_success() {
        return Err(resp.to_error());
    }

    let from_body = match resp.json() {
        Some(value) => envelope::decode::<CsrfMintResponse>(value).ok().and_then(|r| r.csrf_token),
        None => None,
    };
    let token = from_body
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .or_else(|| header_text(&resp.headers, &transport.header_names().csrf))
        .ok_or_else(|| SessionError::Decode("csrf mint response carried no token".to_owned()))?;
    transport.store_csrf(&token);
    debug!("minted csrf token");
    Ok(token)
}

fn json_body(resp: &RawResponse) -> Result<serde_json::Value, SessionError> {
    resp.json().ok_or_else(|| SessionError::Decode("refresh response is not json".to_owned()))
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
