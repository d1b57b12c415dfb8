// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod credential;
pub mod envelope;
pub mod error;
pub mod interceptor;
pub mod refresh;
pub mod request;
pub mod step_up;
pub mod transport;

pub use client::SessionClient;
pub use config::SessionConfig;
pub use context::{SessionContext, SessionHooks};
pub use credential::{MemoryCredentials, TokenPair};
pub use error::SessionError;
pub use request::{ApiRequest, ApiResponse, ResponseBody, ResponseKind};
pub use step_up::{PendingRequest, StepUpChallenge, StepUpHandler};
