// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client wiring of resolvers and host callbacks.
//!
//! Built once and owned by a single [`crate::client::SessionClient`], so
//! independent clients never share credentials or handlers.

use std::sync::Arc;

use crate::credential::{CredentialResolver, CsrfStore, MemoryCredentials, TokenUpdater};

/// Host callbacks for outcomes the layer cannot recover from by itself.
pub trait SessionHooks: Send + Sync {
    /// A refresh failed for a session that previously held a token.
    fn on_unauthorized(&self) {}

    /// Route the host is currently showing, if it has one.
    fn current_path(&self) -> Option<String> {
        None
    }

    /// Hard navigation to `path`.
    fn navigate(&self, path: &str) {
        let _ = path;
    }
}

/// Hooks that ignore every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}

/// Resolvers and hooks injected into one client.
#[derive(Clone)]
pub struct SessionContext {
    pub credentials: Arc<dyn CredentialResolver>,
    pub csrf: Arc<dyn CsrfStore>,
    pub updater: Arc<dyn TokenUpdater>,
    pub hooks: Arc<dyn SessionHooks>,
}

impl SessionContext {
    pub fn new(
        credentials: Arc<dyn CredentialResolver>,
        csrf: Arc<dyn CsrfStore>,
        updater: Arc<dyn TokenUpdater>,
    ) -> Self {
        Self { credentials, csrf, updater, hooks: Arc::new(NoopHooks) }
    }

    /// Context backed entirely by one [`MemoryCredentials`].
    pub fn in_memory(store: Arc<MemoryCredentials>) -> Self {
        Self::new(
            Arc::clone(&store) as Arc<dyn CredentialResolver>,
            Arc::clone(&store) as Arc<dyn CsrfStore>,
            store as Arc<dyn TokenUpdater>,
        )
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("has_token", &self.credentials.access_token().is_some())
            .field("tenant_id", &self.credentials.tenant_id())
            .finish_non_exhaustive()
    }
}
