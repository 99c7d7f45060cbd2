// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Subprocess execution helper shared by the sandbox tool and the agent CLI
//! invocation itself (`spec.md` §4.2 "A kill timer enforces
//! `config.claude_timeout`").

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Run a subprocess command with a timeout, killing the child on expiry.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        )),
    }
}
