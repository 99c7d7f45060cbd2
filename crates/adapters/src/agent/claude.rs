// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Real `AgentGateway`: assembles the `claude` CLI invocation and runs it
//! through a sandbox tool (or directly on the host when sandboxing is
//! disabled). `spec.md` §4.2 "Invocation".

use super::sandbox::{is_sandbox_gone, SandboxCell, SandboxTool, CONFLICT_ERROR_SUBSTRING};
use super::{
    is_auth_error_message, AgentConfig, AgentError, AgentGateway, AgentSource, SendOptions,
    SendResult,
};
use crate::session_files::SessionStore;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;

/// `spec.md` §4.2 "Retry policy for one specific error substring".
const STALE_SESSION_SUBSTRING: &str = "No conversation found with session ID";

#[derive(Debug, Deserialize)]
struct RawAgentOutput {
    result: String,
    session_id: String,
}

pub struct ClaudeAgentGateway {
    sandbox_cell: SandboxCell,
    sandbox_tool: Arc<dyn SandboxTool>,
    sessions: SessionStore,
    /// Process-wide single-consumer queue (`spec.md` §4.2 "FIFO").
    fifo: AsyncMutex<()>,
}

impl ClaudeAgentGateway {
    pub fn new(sandbox_cell: SandboxCell, sandbox_tool: Arc<dyn SandboxTool>, sessions: SessionStore) -> Self {
        Self {
            sandbox_cell,
            sandbox_tool,
            sessions,
            fifo: AsyncMutex::new(()),
        }
    }

    /// `spec.md` §4.2 "Sandbox lifecycle": in-memory cache → on-disk file →
    /// newly created, with one conflict-recovery retry.
    async fn ensure_sandbox(&self, project_root: &Path) -> Result<String, AgentError> {
        if let Some(id) = self.sandbox_cell.get() {
            return Ok(id);
        }

        match self.sandbox_tool.run(project_root).await {
            Ok(id) => {
                self.sandbox_cell
                    .set(&id)
                    .map_err(|e| AgentError::Sandbox(e.to_string()))?;
                Ok(id)
            }
            Err(e) if e.to_string().contains(CONFLICT_ERROR_SUBSTRING) => {
                self.recover_from_conflict(project_root).await
            }
            Err(e) => Err(e),
        }
    }

    async fn recover_from_conflict(&self, project_root: &Path) -> Result<String, AgentError> {
        let candidates = self.sandbox_tool.list().await?;
        for candidate in candidates {
            if candidate.workspace != project_root {
                continue;
            }
            let confirmed = self.sandbox_tool.inspect(&candidate.id).await?;
            if confirmed.workspace == project_root {
                self.sandbox_tool.rm(&confirmed.id).await?;
            }
        }

        let id = self.sandbox_tool.run(project_root).await?;
        self.sandbox_cell
            .set(&id)
            .map_err(|e| AgentError::Sandbox(e.to_string()))?;
        Ok(id)
    }

    fn build_argv(
        config: &AgentConfig,
        options: &SendOptions,
        resume_session: Option<&str>,
        prompt_text: &str,
    ) -> Vec<String> {
        let mut argv = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
            "--append-system-prompt-file".to_string(),
            config.system_prompt_path.display().to_string(),
        ];
        if options.bypass_mode {
            argv.push("--dangerously-skip-permissions".to_string());
        }
        if let Some(session) = resume_session {
            argv.push("--resume".to_string());
            argv.push(session.to_string());
        }
        // `--` guard is mandatory: prompts may start with `-`.
        argv.push("--".to_string());
        argv.push(prompt_text.to_string());
        argv
    }

    fn build_env(config: &AgentConfig) -> Vec<(String, String)> {
        let mut env = vec![
            ("FORCE_COLOR".to_string(), "0".to_string()),
            ("CLAUDECODE".to_string(), String::new()),
        ];
        // `config.extra_env` is a `BTreeMap`, already key-sorted.
        for (key, value) in &config.extra_env {
            if key == "FORCE_COLOR" || key == "CLAUDECODE" {
                continue;
            }
            env.push((key.clone(), value.clone()));
        }
        env
    }

    async fn invoke_once(
        &self,
        prompt_text: &str,
        config: &AgentConfig,
        options: &SendOptions,
        resume_session: Option<&str>,
    ) -> Result<Output, AgentError> {
        let argv = Self::build_argv(config, options, resume_session, prompt_text);
        let env = Self::build_env(config);

        if config.enable_sandbox {
            let sandbox_id = self.ensure_sandbox(&config.project_root).await?;
            self.sandbox_tool
                .exec(&sandbox_id, &argv, &env, config.claude_timeout)
                .await
        } else {
            let mut cmd = Command::new("claude");
            cmd.args(&argv);
            for (key, value) in &env {
                cmd.env(key, value);
            }
            crate::subprocess::run_with_timeout(cmd, config.claude_timeout, "agent-CLI invocation")
                .await
                .map_err(AgentError::InvocationFailed)
        }
    }

    async fn try_invoke(
        &self,
        prompt_text: &str,
        config: &AgentConfig,
        options: &SendOptions,
        resume_session: Option<&str>,
    ) -> Result<SendResult, AgentError> {
        let output = self.invoke_once(prompt_text, config, options, resume_session).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            if is_auth_error_message(&stdout) || is_auth_error_message(&stderr) {
                return Err(AgentError::Auth(stderr));
            }
            return Err(AgentError::InvocationFailed(stderr));
        }

        let parsed: RawAgentOutput = serde_json::from_str(stdout.trim()).map_err(|e| {
            AgentError::ParseFailure(format!(
                "source={} stdout_len={} stderr_len={} stdout_head={:?} stderr_head={:?}: {e}",
                options.source.as_str(),
                stdout.len(),
                stderr.len(),
                truncate(&stdout, 200),
                truncate(&stderr, 200),
            ))
        })?;

        self.sessions
            .write(&options.session_target, &parsed.session_id)
            .map_err(|e| AgentError::InvocationFailed(e.to_string()))?;

        Ok(SendResult {
            response: parsed.result,
            session_id: parsed.session_id,
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[async_trait]
impl AgentGateway for ClaudeAgentGateway {
    async fn send_to_agent(
        &self,
        prompt_text: &str,
        config: &AgentConfig,
        options: SendOptions,
    ) -> Result<SendResult, AgentError> {
        let _fifo_guard = self.fifo.lock().await;

        let resume_session = self
            .sessions
            .read(&options.session_target)
            .map_err(|e| AgentError::InvocationFailed(e.to_string()))?;

        match self
            .try_invoke(prompt_text, config, &options, resume_session.as_deref())
            .await
        {
            Ok(result) => Ok(result),
            Err(err) => {
                let message = err.to_string();
                let should_retry_fresh = is_sandbox_gone(&message) || message.contains(STALE_SESSION_SUBSTRING);
                if !should_retry_fresh {
                    return Err(err);
                }
                if is_sandbox_gone(&message) {
                    self.sandbox_cell.clear();
                }
                let _ = self.sessions.clear(&options.session_target);
                self.try_invoke(prompt_text, config, &options, None).await
            }
        }
    }
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
