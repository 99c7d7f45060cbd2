// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

use super::*;
use crate::agent::sandbox::FakeSandboxTool;
use crate::session_files::SessionTarget;
use std::time::Duration;

fn config(enable_sandbox: bool, project_root: &Path) -> AgentConfig {
    AgentConfig {
        enable_sandbox,
        claude_timeout: Duration::from_secs(5),
        extra_env: Default::default(),
        system_prompt_path: project_root.join("system_prompt.md"),
        project_root: project_root.to_path_buf(),
    }
}

fn gateway(dir: &Path, tool: Arc<FakeSandboxTool>) -> ClaudeAgentGateway {
    let cell = SandboxCell::new(dir.join("sandbox_id.txt"));
    let sessions = SessionStore::new(dir.join("sessions"));
    ClaudeAgentGateway::new(cell, tool, sessions)
}

#[tokio::test]
async fn sends_prompt_and_persists_session_id() {
    let dir = tempfile::tempdir().unwrap();
    let tool = Arc::new(FakeSandboxTool::new());
    tool.set_exec_response(r#"{"result":"hi there","session_id":"sess-1"}"#, "");
    let gw = gateway(dir.path(), tool.clone());

    let result = gw
        .send_to_agent(
            "hello",
            &config(true, dir.path()),
            SendOptions::new(AgentSource::Dm, SessionTarget::Main),
        )
        .await
        .unwrap();

    assert_eq!(result.response, "hi there");
    assert_eq!(result.session_id, "sess-1");
    assert_eq!(tool.run_call_count(), 1);
}

#[tokio::test]
async fn reuses_the_cached_sandbox_across_calls() {
    let dir = tempfile::tempdir().unwrap();
    let tool = Arc::new(FakeSandboxTool::new());
    tool.set_exec_response(r#"{"result":"ok","session_id":"s"}"#, "");
    let gw = gateway(dir.path(), tool.clone());
    let cfg = config(true, dir.path());

    gw.send_to_agent("one", &cfg, SendOptions::new(AgentSource::Dm, SessionTarget::Main))
        .await
        .unwrap();
    gw.send_to_agent("two", &cfg, SendOptions::new(AgentSource::Dm, SessionTarget::Main))
        .await
        .unwrap();

    assert_eq!(tool.run_call_count(), 1);
}

#[tokio::test]
async fn recovers_from_a_sandbox_creation_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let tool = Arc::new(FakeSandboxTool::new());
    tool.simulate_conflict_once(dir.path());
    tool.set_exec_response(r#"{"result":"ok","session_id":"s"}"#, "");
    let gw = gateway(dir.path(), tool.clone());

    let result = gw
        .send_to_agent(
            "hello",
            &config(true, dir.path()),
            SendOptions::new(AgentSource::Dm, SessionTarget::Main),
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn a_parse_failure_reports_diagnostics_and_does_not_write_a_session_file() {
    let dir = tempfile::tempdir().unwrap();
    let tool = Arc::new(FakeSandboxTool::new());
    tool.set_exec_response("not json", "");
    let gw = gateway(dir.path(), tool.clone());

    let err = gw
        .send_to_agent(
            "hello",
            &config(true, dir.path()),
            SendOptions::new(AgentSource::Dm, SessionTarget::Main),
        )
        .await
        .unwrap_err();

    match err {
        AgentError::ParseFailure(msg) => assert!(msg.contains("stdout_head")),
        other => panic!("expected ParseFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn resumes_an_existing_session_id_on_the_next_call() {
    let dir = tempfile::tempdir().unwrap();
    let tool = Arc::new(FakeSandboxTool::new());
    tool.set_exec_response(r#"{"result":"ok","session_id":"sess-A"}"#, "");
    let gw = gateway(dir.path(), tool.clone());
    let cfg = config(true, dir.path());
    let target = SessionTarget::Isolated("weekly-report".to_string());

    gw.send_to_agent("first", &cfg, SendOptions::new(AgentSource::Scheduler, target.clone()))
        .await
        .unwrap();

    tool.set_exec_response(r#"{"result":"ok","session_id":"sess-B"}"#, "");
    gw.send_to_agent("second", &cfg, SendOptions::new(AgentSource::Scheduler, target))
        .await
        .unwrap();

    let calls = tool.exec_calls();
    assert_eq!(calls.len(), 2);
}
