// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The agent-CLI gateway (`spec.md` §4.2): FIFO-serialized sandbox
//! invocations, prompt assembly, and session persistence.

mod claude;
pub mod prompt;
pub mod sandbox;

pub use claude::ClaudeAgentGateway;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{AgentCall, FakeAgentGateway};

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::session_files::SessionTarget;

/// `spec.md` §4.2 options: "source tag (`dm|scheduler|manual`)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentSource {
    Dm,
    Scheduler,
    Manual,
}

impl AgentSource {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentSource::Dm => "dm",
            AgentSource::Scheduler => "scheduler",
            AgentSource::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentDescriptor {
    pub path: PathBuf,
    pub name: String,
}

/// Per-call options (`spec.md` §4.2 "Contract").
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub bypass_mode: bool,
    pub attachments: Vec<AttachmentDescriptor>,
    pub source: AgentSource,
    pub author_id: Option<String>,
    pub session_target: SessionTarget,
}

impl SendOptions {
    pub fn new(source: AgentSource, session_target: SessionTarget) -> Self {
        Self {
            bypass_mode: false,
            attachments: Vec::new(),
            source,
            author_id: None,
            session_target,
        }
    }
}

/// Invocation-wide configuration, set once per call from `Settings`
/// (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub enable_sandbox: bool,
    pub claude_timeout: Duration,
    pub extra_env: std::collections::BTreeMap<String, String>,
    pub system_prompt_path: PathBuf,
    pub project_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SendResult {
    pub response: String,
    pub session_id: String,
}

#[derive(Debug, Error, Clone)]
pub enum AgentError {
    #[error("{0}")]
    Auth(String),
    #[error("agent-CLI output parse failure: {0}")]
    ParseFailure(String),
    #[error("sandbox error: {0}")]
    Sandbox(String),
    #[error("agent-CLI invocation failed: {0}")]
    InvocationFailed(String),
    #[error("agent-CLI timed out")]
    Timeout,
}

/// `spec.md` §4.2 "Auth-error classification (used by the worker)".
const AUTH_ERROR_SUBSTRINGS: [&str; 3] = [
    "Expected token to be set for this request, but none was present",
    "Not logged in",
    "Please run /login",
];

pub fn is_auth_error_message(message: &str) -> bool {
    AUTH_ERROR_SUBSTRINGS.iter().any(|s| message.contains(s))
}

impl AgentError {
    pub fn is_auth_error(&self) -> bool {
        matches!(self, AgentError::Auth(_)) || is_auth_error_message(&self.to_string())
    }
}

/// `bridge_adapters::agent::AgentGateway` (`spec.md` §4.2 "Contract (one
/// public call)").
#[async_trait]
pub trait AgentGateway: Send + Sync + 'static {
    async fn send_to_agent(
        &self,
        prompt_text: &str,
        config: &AgentConfig,
        options: SendOptions,
    ) -> Result<SendResult, AgentError>;

    fn is_auth_error(&self, err: &AgentError) -> bool {
        err.is_auth_error()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
