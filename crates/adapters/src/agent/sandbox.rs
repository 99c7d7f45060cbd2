// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Sandbox identifier cell and the tool trait used to drive the container
//! runtime (`spec.md` §3 "Sandbox identifier", §9 "Sandbox-identifier
//! global state").

use super::AgentError;
use crate::subprocess;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// In-memory value mirrored to an on-disk path. `spec.md` §9: "access only
/// through get/set/clear functions that synchronize the two. Never read the
/// on-disk value when the cell is populated."
pub struct SandboxCell {
    value: Mutex<Option<String>>,
    path: PathBuf,
}

impl SandboxCell {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            value: Mutex::new(None),
            path: path.into(),
        }
    }

    /// In-memory cache, falling back to the on-disk file only when the cell
    /// is empty (`spec.md` §4.2 "in-memory cache → on-disk file").
    pub fn get(&self) -> Option<String> {
        {
            let guard = self.value.lock();
            if guard.is_some() {
                return guard.clone();
            }
        }
        let from_disk = std::fs::read_to_string(&self.path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(id) = &from_disk {
            *self.value.lock() = Some(id.clone());
        }
        from_disk
    }

    pub fn set(&self, sandbox_id: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, sandbox_id)?;
        *self.value.lock() = Some(sandbox_id.to_string());
        Ok(())
    }

    pub fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
        *self.value.lock() = None;
    }
}

#[derive(Debug, Clone)]
pub struct SandboxInfo {
    pub id: String,
    pub workspace: PathBuf,
}

/// Matches `spec.md` §4.2: "If creation fails with a 'credentials conflict
/// for this workspace' error". The real tool's exact wording is
/// collaborator-specific; this substring is the contract this gateway
/// depends on.
pub const CONFLICT_ERROR_SUBSTRING: &str = "credentials conflict for this workspace";

/// `spec.md` §4.2 "sandbox-gone" set.
pub const SANDBOX_GONE_SUBSTRINGS: [&str; 2] = ["No such container", "is not running"];

pub fn is_sandbox_gone(message: &str) -> bool {
    SANDBOX_GONE_SUBSTRINGS.iter().any(|s| message.contains(s))
}

/// The sandbox-lifecycle collaborator (`spec.md` §4.2: "the sandbox-run
/// tool" / "the sandbox-exec tool"), abstracted as `run`/`exec`/`list`/
/// `inspect`/`rm`, mirroring the teacher's `SessionAdapter`/`AgentAdapter`
/// trait-plus-fake split.
#[async_trait]
pub trait SandboxTool: Send + Sync + 'static {
    async fn run(&self, workspace: &Path) -> Result<String, AgentError>;

    async fn exec(
        &self,
        sandbox_id: &str,
        argv: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> Result<Output, AgentError>;

    async fn list(&self) -> Result<Vec<SandboxInfo>, AgentError>;

    async fn inspect(&self, sandbox_id: &str) -> Result<SandboxInfo, AgentError>;

    async fn rm(&self, sandbox_id: &str) -> Result<(), AgentError>;
}

/// Administrative sandbox-CLI calls (`run`/`list`/`inspect`/`rm`) get their
/// own timeout, distinct from `config.claude_timeout` which only bounds
/// `exec`.
const SANDBOX_ADMIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shells out to an external sandbox-management CLI (`spec.md` §4.2 "the
/// sandbox-run tool" / "the sandbox-exec tool"), the same way
/// `bridge_adapters::session_files`'s teacher-equivalent drives `tmux`.
/// `list`/`inspect` output is one sandbox per line, tab-separated
/// `<id>\t<workspace>`.
pub struct CliSandboxTool {
    binary: String,
}

impl CliSandboxTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for CliSandboxTool {
    fn default() -> Self {
        Self::new("sandbox")
    }
}

fn parse_sandbox_line(line: &str) -> Option<SandboxInfo> {
    let mut parts = line.splitn(2, '\t');
    let id = parts.next()?.trim();
    let workspace = parts.next()?.trim();
    if id.is_empty() || workspace.is_empty() {
        return None;
    }
    Some(SandboxInfo { id: id.to_string(), workspace: PathBuf::from(workspace) })
}

#[async_trait]
impl SandboxTool for CliSandboxTool {
    async fn run(&self, workspace: &Path) -> Result<String, AgentError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("run").arg("--workspace").arg(workspace);
        let output = subprocess::run_with_timeout(cmd, SANDBOX_ADMIN_TIMEOUT, "sandbox run")
            .await
            .map_err(AgentError::Sandbox)?;
        if !output.status.success() {
            return Err(AgentError::Sandbox(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn exec(
        &self,
        sandbox_id: &str,
        argv: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> Result<Output, AgentError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("exec").arg(sandbox_id);
        for (key, value) in env {
            cmd.arg("--env").arg(format!("{key}={value}"));
        }
        cmd.arg("--").args(argv);
        subprocess::run_with_timeout(cmd, timeout, "sandbox exec")
            .await
            .map_err(AgentError::Sandbox)
    }

    async fn list(&self) -> Result<Vec<SandboxInfo>, AgentError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("ls");
        let output = subprocess::run_with_timeout(cmd, SANDBOX_ADMIN_TIMEOUT, "sandbox ls")
            .await
            .map_err(AgentError::Sandbox)?;
        if !output.status.success() {
            return Err(AgentError::Sandbox(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_sandbox_line).collect())
    }

    async fn inspect(&self, sandbox_id: &str) -> Result<SandboxInfo, AgentError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("inspect").arg(sandbox_id);
        let output = subprocess::run_with_timeout(cmd, SANDBOX_ADMIN_TIMEOUT, "sandbox inspect")
            .await
            .map_err(AgentError::Sandbox)?;
        if !output.status.success() {
            return Err(AgentError::Sandbox(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .find_map(parse_sandbox_line)
            .ok_or_else(|| AgentError::Sandbox(format!("no such sandbox: {sandbox_id}")))
    }

    async fn rm(&self, sandbox_id: &str) -> Result<(), AgentError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("rm").arg(sandbox_id);
        let output = subprocess::run_with_timeout(cmd, SANDBOX_ADMIN_TIMEOUT, "sandbox rm")
            .await
            .map_err(AgentError::Sandbox)?;
        if !output.status.success() {
            return Err(AgentError::Sandbox(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSandboxTool;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::os::unix::process::ExitStatusExt;
    use std::sync::Arc;

    #[derive(Clone)]
    pub struct FakeSandboxTool {
        state: Arc<Mutex<FakeState>>,
    }

    struct FakeState {
        sandboxes: HashMap<String, SandboxInfo>,
        next_id: u64,
        conflict_pending: bool,
        exec_response: Option<(String, String)>,
        exec_calls: Vec<String>,
        run_calls: u32,
    }

    impl Default for FakeSandboxTool {
        fn default() -> Self {
            Self {
                state: Arc::new(Mutex::new(FakeState {
                    sandboxes: HashMap::new(),
                    next_id: 1,
                    conflict_pending: false,
                    exec_response: Some(("{\"result\":\"ok\",\"session_id\":\"s1\"}".to_string(), String::new())),
                    exec_calls: Vec::new(),
                    run_calls: 0,
                })),
            }
        }
    }

    impl FakeSandboxTool {
        pub fn new() -> Self {
            Self::default()
        }

        /// The next `run` call fails once with the conflict error, after
        /// which a previously-created sandbox for the same workspace is
        /// discoverable via `list`/`inspect` (`spec.md` §8 "Sandbox conflict
        /// recovery").
        pub fn simulate_conflict_once(&self, workspace: &Path) {
            let mut state = self.state.lock();
            let id = format!("conflicted-{}", state.next_id);
            state.next_id += 1;
            state.sandboxes.insert(
                id.clone(),
                SandboxInfo {
                    id,
                    workspace: workspace.to_path_buf(),
                },
            );
            state.conflict_pending = true;
        }

        pub fn set_exec_response(&self, stdout: impl Into<String>, stderr: impl Into<String>) {
            self.state.lock().exec_response = Some((stdout.into(), stderr.into()));
        }

        pub fn exec_calls(&self) -> Vec<String> {
            self.state.lock().exec_calls.clone()
        }

        pub fn run_call_count(&self) -> u32 {
            self.state.lock().run_calls
        }
    }

    #[async_trait]
    impl SandboxTool for FakeSandboxTool {
        async fn run(&self, workspace: &Path) -> Result<String, AgentError> {
            let mut state = self.state.lock();
            state.run_calls += 1;
            if state.conflict_pending {
                state.conflict_pending = false;
                return Err(AgentError::Sandbox(CONFLICT_ERROR_SUBSTRING.to_string()));
            }
            let id = format!("sandbox-{}", state.next_id);
            state.next_id += 1;
            state.sandboxes.insert(
                id.clone(),
                SandboxInfo {
                    id: id.clone(),
                    workspace: workspace.to_path_buf(),
                },
            );
            Ok(id)
        }

        async fn exec(
            &self,
            sandbox_id: &str,
            _argv: &[String],
            _env: &[(String, String)],
            _timeout: Duration,
        ) -> Result<Output, AgentError> {
            self.state.lock().exec_calls.push(sandbox_id.to_string());
            let (stdout, stderr) = self
                .state
                .lock()
                .exec_response
                .clone()
                .unwrap_or_default();
            Ok(Output {
                status: std::process::ExitStatus::from_raw(0),
                stdout: stdout.into_bytes(),
                stderr: stderr.into_bytes(),
            })
        }

        async fn list(&self) -> Result<Vec<SandboxInfo>, AgentError> {
            Ok(self.state.lock().sandboxes.values().cloned().collect())
        }

        async fn inspect(&self, sandbox_id: &str) -> Result<SandboxInfo, AgentError> {
            self.state
                .lock()
                .sandboxes
                .get(sandbox_id)
                .cloned()
                .ok_or_else(|| AgentError::Sandbox(format!("no such sandbox: {sandbox_id}")))
        }

        async fn rm(&self, sandbox_id: &str) -> Result<(), AgentError> {
            self.state.lock().sandboxes.remove(sandbox_id);
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "sandbox_tests.rs"]
mod tests;
