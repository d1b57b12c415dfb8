// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-supplied credential resolvers.
//!
//! The session layer never persists tokens. It reads the access token and
//! tenant through [`CredentialResolver`], reads and rotates the CSRF token
//! through [`CsrfStore`], and hands refreshed pairs to a [`TokenUpdater`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Access token plus the optional CSRF token issued alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
}

/// Resolves the current session's access token and tenant.
pub trait CredentialResolver: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn tenant_id(&self) -> Option<String>;
}

/// Holds the single current CSRF token.
pub trait CsrfStore: Send + Sync {
    fn csrf_token(&self) -> Option<String>;
    fn store_csrf_token(&self, token: &str);
}

/// Receives every token pair produced by a refresh or login.
pub trait TokenUpdater: Send + Sync {
    fn update(&self, pair: &TokenPair);
}

impl<F> TokenUpdater for F
where
    F: Fn(&TokenPair) + Send + Sync,
{
    fn update(&self, pair: &TokenPair) {
        self(pair)
    }
}

/// In-process credential store implementing all three resolver traits.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    access_token: RwLock<Option<String>>,
    tenant_id: RwLock<Option<String>>,
    csrf_token: RwLock<Option<String>>,
}

impl MemoryCredentials {
    pub fn new(access_token: Option<String>, tenant_id: Option<String>) -> Self {
        Self {
            access_token: RwLock::new(access_token),
            tenant_id: RwLock::new(tenant_id),
            csrf_token: RwLock::new(None),
        }
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    pub fn set_tenant_id(&self, tenant: Option<String>) {
        *self.tenant_id.write() = tenant;
    }

    /// Drop every held token (e.g. on logout).
    pub fn clear(&self) {
        *self.access_token.write() = None;
        *self.csrf_token.write() = None;
    }
}

impl CredentialResolver for MemoryCredentials {
    fn access_token(&self) -> Option<String> {
        self.access_token.read().clone()
    }

    fn tenant_id(&self) -> Option<String> {
        self.tenant_id.read().clone()
    }
}

impl CsrfStore for MemoryCredentials {
    fn csrf_token(&self) -> Option<String> {
        self.csrf_token.read().clone()
    }

    fn store_csrf_token(&self, token: &str) {
        *self.csrf_token.write() = Some(token.to_owned());
    }
}

impl TokenUpdater for MemoryCredentials {
    fn update(&self, pair: &TokenPair) {
        *self.access_token.write() = Some(pair.access_token.clone());
        if let Some(ref csrf) = pair.csrf_token {
            *self.csrf_token.write() = Some(csrf.clone());
        }
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
