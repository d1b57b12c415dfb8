// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `orgclient` command line: one-shot calls through a session client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::SessionClient;
use crate::config::SessionConfig;
use crate::context::{SessionContext, SessionHooks};
use crate::credential::{CsrfStore, MemoryCredentials};
use crate::request::{ApiRequest, ResponseBody};

/// Session-aware client for the organization API.
#[derive(Debug, Parser)]
#[command(name = "orgclient", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub session: SessionConfig,

    /// Access token to start the session with.
    #[arg(long, env = "ORGCLIENT_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Tenant (organization) id sent with every non-login request.
    #[arg(long, env = "ORGCLIENT_ORG_ID")]
    pub org_id: Option<String>,

    /// CSRF token to seed the session with.
    #[arg(long, env = "ORGCLIENT_CSRF_TOKEN", hide_env_values = true)]
    pub csrf_token: Option<String>,

    /// Log level filter.
    #[arg(long, env = "ORGCLIENT_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, env = "ORGCLIENT_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one API request and print the unwrapped response.
    Call {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE).
        method: String,
        /// Path relative to the base URL.
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
        /// Write the raw response body to this file instead of printing it.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Log in with a JSON credentials body and print the issued tokens.
    Login {
        #[arg(long)]
        data: String,
    },
    /// Refresh the session and print the new tokens.
    Refresh,
    /// Mint a fresh CSRF token and print it.
    Csrf,
}

/// Hooks for a terminal host: nothing to navigate, so only log.
#[derive(Debug, Default)]
pub struct CliHooks;

impl SessionHooks for CliHooks {
    fn on_unauthorized(&self) {
        warn!("session expired, log in again");
    }

    fn navigate(&self, path: &str) {
        warn!(%path, "server requires a password change");
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = Arc::new(MemoryCredentials::new(cli.access_token, cli.org_id));
    if let Some(ref csrf) = cli.csrf_token {
        store.store_csrf_token(csrf);
    }
    let ctx = SessionContext::in_memory(store).with_hooks(Arc::new(CliHooks));
    let client = SessionClient::new(cli.session, ctx)?;

    match cli.command {
        Command::Call { method, path, data, output } => {
            let method = parse_method(&method)?;
            let mut request = ApiRequest::new(method, path);
            if let Some(body) = parse_body(data.as_deref())? {
                request = request.json(&body)?;
            }
            if output.is_some() {
                request = request.binary();
            }
            let resp = client.execute(request).await?;
            match output {
                Some(path) => {
                    let bytes = resp.into_bytes();
                    tokio::fs::write(&path, &bytes)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), bytes = bytes.len(), "response saved");
                }
                None => match resp.body {
                    ResponseBody::Json(value) => print_json(&value)?,
                    ResponseBody::Binary(bytes) => {
                        println!("<{} bytes of binary data>", bytes.len())
                    }
                },
            }
        }
        Command::Login { data } => {
            let body = parse_body(Some(&data))?.unwrap_or(Value::Null);
            let pair = client.login(&body).await?;
            print_json(&serde_json::to_value(pair)?)?;
        }
        Command::Refresh => {
            let pair = client.refresh_session().await?;
            print_json(&serde_json::to_value(pair)?)?;
        }
        Command::Csrf => {
            println!("{}", client.mint_csrf().await?);
        }
    }
    Ok(())
}

fn parse_method(method: &str) -> anyhow::Result<Method> {
    let upper = method.trim().to_ascii_uppercase();
    match upper.as_str() {
        "GET" | "POST" | "PUT" | "PATCH" | "DELETE" | "HEAD" => {
            Method::from_bytes(upper.as_bytes()).context("invalid method")
        }
        other => anyhow::bail!("unsupported method: {other}"),
    }
}

fn parse_body(data: Option<&str>) -> anyhow::Result<Option<Value>> {
    data.map(|raw| serde_json::from_str(raw).context("invalid JSON body")).transpose()
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
