use super::*;
use bridge_adapters::agent::{AgentError, SendResult};
use bridge_adapters::platform::{FakePlatformAdapter, PlatformAttachment, PlatformCall, PlatformError, PlatformMessage};
use bridge_adapters::{FakeAgentGateway, SessionStore};
use std::collections::BTreeMap;
use tempfile::TempDir;

struct Fixture {
    store: Arc<EventStore>,
    platform: Arc<FakePlatformAdapter>,
    agent: Arc<FakeAgentGateway>,
    handler: DmHandler<FakePlatformAdapter, FakeAgentGateway>,
    _tmp: TempDir,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("PROMPT.md"), "hi {{user_input}} / {{assistant_context}}").unwrap();

    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let platform = Arc::new(FakePlatformAdapter::new());
    let agent = Arc::new(FakeAgentGateway::new());
    let sessions = SessionStore::new(tmp.path().join("sessions"));
    let agent_config = AgentConfig {
        enable_sandbox: false,
        claude_timeout: Duration::from_secs(60),
        extra_env: BTreeMap::new(),
        system_prompt_path: tmp.path().join("system-prompt.md"),
        project_root: tmp.path().to_path_buf(),
    };

    let handler = DmHandler::new(
        store.clone(),
        platform.clone(),
        agent.clone(),
        sessions,
        agent_config,
        false,
        tmp.path().join("PROMPT.md"),
        tmp.path().join("attachments"),
    );

    Fixture {
        store,
        platform,
        agent,
        handler,
        _tmp: tmp,
    }
}

fn payload() -> DmIncomingPayload {
    DmIncomingPayload {
        message_id: "111".to_string(),
        channel_id: "chan-1".to_string(),
        author_id: "111111111111111111".to_string(),
    }
}

fn push_message(platform: &FakePlatformAdapter, content: &str) {
    platform.push_message(PlatformMessage {
        id: "111".to_string(),
        channel_id: "chan-1".to_string(),
        author_id: "111111111111111111".to_string(),
        is_bot: false,
        content: content.to_string(),
        attachments: Vec::new(),
    });
}

#[tokio::test]
async fn happy_path_applies_both_reactions_and_publishes_the_reply() {
    let f = fixture();
    push_message(&f.platform, "hello there");

    let result = f.handler.handle(&payload()).await;

    assert!(result.is_ok());
    let reactions = f.platform.reactions();
    assert_eq!(reactions.len(), 2);
    assert_eq!(reactions[0].2, EYE_EMOJI);
    assert_eq!(reactions[1].2, CHECK_EMOJI);

    let state = f.store.get_dm_state("111").unwrap().unwrap();
    assert!(state.eye_applied && state.processing_done && state.check_applied);
}

#[tokio::test]
async fn replay_after_full_completion_does_nothing_twice() {
    let f = fixture();
    push_message(&f.platform, "hello there");

    f.handler.handle(&payload()).await.unwrap();
    let calls_after_first = f.agent.calls().len();
    f.handler.handle(&payload()).await.unwrap();

    assert_eq!(f.agent.calls().len(), calls_after_first);
    assert_eq!(f.platform.reactions().len(), 2);
}

#[tokio::test]
async fn terminal_failed_dm_is_skipped_entirely() {
    let f = fixture();
    push_message(&f.platform, "hello");
    f.store.upsert_dm("111", "chan-1", "111111111111111111").unwrap();
    f.store.mark_dm_terminal_failure("111", "previously failed").unwrap();

    let result = f.handler.handle(&payload()).await;

    assert!(result.is_ok());
    assert!(f.platform.calls().is_empty());
}

#[tokio::test]
async fn unknown_channel_is_terminal_and_settles_dm_state() {
    let f = fixture();
    f.platform.mark_channel_unknown("chan-1");

    let result = f.handler.handle(&payload()).await;

    assert!(matches!(result, Err(HandlerError::Terminal(_))));
    let reactions = f.platform.reactions();
    assert_eq!(reactions.last().unwrap().2, CROSS_EMOJI);
    let state = f.store.get_dm_state("111").unwrap().unwrap();
    assert!(state.terminal_failed);
}

#[tokio::test]
async fn auth_error_publishes_a_recovery_outbound_and_goes_terminal() {
    let f = fixture();
    push_message(&f.platform, "hello");
    f.agent
        .push_response(Err(AgentError::Auth("Not logged in".to_string())));

    let result = f.handler.handle(&payload()).await;

    assert!(matches!(result, Err(HandlerError::Terminal(_))));
    // Publishing happens via the event store directly, not a platform call;
    // assert on the queued outbound event instead.
    let outbound = f.store.claim_next("outbound-worker").unwrap().unwrap();
    match outbound.event_type {
        EventType::OutboundDmRequest(p) => {
            assert_eq!(p.text, AUTH_RECOVERY_MESSAGE);
            assert_eq!(p.channel_id.as_deref(), Some("chan-1"));
        }
        other => panic!("unexpected event type: {other:?}"),
    }
}

#[tokio::test]
async fn missing_attachment_fails_before_calling_the_agent() {
    let f = fixture();
    f.platform.push_message(PlatformMessage {
        id: "111".to_string(),
        channel_id: "chan-1".to_string(),
        author_id: "111111111111111111".to_string(),
        is_bot: false,
        content: "see attached".to_string(),
        attachments: vec![PlatformAttachment {
            url: "https://example.invalid/a.png".to_string(),
            filename: "a.png".to_string(),
        }],
    });

    let result = f.handler.handle(&payload()).await;

    assert!(matches!(result, Err(HandlerError::Terminal(_))));
    assert!(f.agent.calls().is_empty());
}

#[tokio::test]
async fn other_agent_errors_go_terminal_without_an_outbound() {
    let f = fixture();
    push_message(&f.platform, "hello");
    f.agent
        .push_response(Err(AgentError::InvocationFailed("boom".to_string())));

    let result = f.handler.handle(&payload()).await;

    assert!(matches!(result, Err(HandlerError::Terminal(_))));
    assert!(f.store.claim_next("outbound-worker").unwrap().is_none());
}

#[tokio::test]
async fn empty_responses_are_retried_up_to_three_times() {
    let f = fixture();
    push_message(&f.platform, "hello");
    f.agent.push_response(Ok(SendResult {
        response: "   ".to_string(),
        session_id: "s".to_string(),
    }));
    f.agent.push_response(Ok(SendResult {
        response: "".to_string(),
        session_id: "s".to_string(),
    }));
    f.agent.push_response(Ok(SendResult {
        response: "finally, a real answer".to_string(),
        session_id: "s".to_string(),
    }));

    let result = f.handler.handle(&payload()).await;

    assert!(result.is_ok());
    assert_eq!(f.agent.calls().len(), 3);
}

#[tokio::test]
async fn reset_command_clears_session_and_replies_directly_without_an_outbound() {
    let f = fixture();
    push_message(&f.platform, "!reset");

    let result = f.handler.handle(&payload()).await;

    assert!(result.is_ok());
    assert!(f.agent.calls().is_empty());
    assert!(f.store.claim_next("outbound-worker").unwrap().is_none());
    let sent = f.platform.sent_channel_messages();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.as_deref().unwrap().contains("Session cleared"));
    assert!(f
        .platform
        .calls()
        .iter()
        .any(|c| matches!(c, PlatformCall::SendToChannel { .. })));
}

#[tokio::test]
async fn session_command_reports_no_active_session_when_none_exists() {
    let f = fixture();
    push_message(&f.platform, "!session");

    f.handler.handle(&payload()).await.unwrap();

    let sent = f.platform.sent_channel_messages();
    assert_eq!(sent[0].1.as_deref(), Some("No active session."));
}

#[tokio::test]
async fn platform_transport_errors_are_retryable_not_terminal() {
    let f = fixture();
    f.platform.set_next_error(PlatformError::Transport("timeout".to_string()));

    let result = f.handler.handle(&payload()).await;

    assert!(matches!(result, Err(HandlerError::Retryable(_))));
}
