// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

use super::*;
use crate::session_files::SessionTarget;
use std::collections::BTreeMap;
use std::time::Duration;

fn config() -> AgentConfig {
    AgentConfig {
        enable_sandbox: false,
        claude_timeout: Duration::from_secs(5),
        extra_env: BTreeMap::new(),
        system_prompt_path: "/tmp/system_prompt.md".into(),
        project_root: "/tmp/project".into(),
    }
}

#[tokio::test]
async fn records_every_call() {
    let gw = FakeAgentGateway::new();
    gw.send_to_agent("hi", &config(), SendOptions::new(AgentSource::Dm, SessionTarget::Main))
        .await
        .unwrap();

    let calls = gw.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].prompt_text, "hi");
}

#[tokio::test]
async fn queued_responses_are_consumed_in_order() {
    let gw = FakeAgentGateway::new();
    gw.push_response(Ok(SendResult {
        response: "first".to_string(),
        session_id: "s1".to_string(),
    }));
    gw.push_response(Err(AgentError::Auth("nope".to_string())));

    let first = gw
        .send_to_agent("a", &config(), SendOptions::new(AgentSource::Dm, SessionTarget::Main))
        .await
        .unwrap();
    assert_eq!(first.response, "first");

    let second = gw
        .send_to_agent("b", &config(), SendOptions::new(AgentSource::Dm, SessionTarget::Main))
        .await;
    assert!(second.is_err());
}

#[tokio::test]
async fn falls_back_to_the_default_response_once_the_queue_is_empty() {
    let gw = FakeAgentGateway::new();
    let result = gw
        .send_to_agent("a", &config(), SendOptions::new(AgentSource::Dm, SessionTarget::Main))
        .await
        .unwrap();
    assert_eq!(result.response, "ok");
}
