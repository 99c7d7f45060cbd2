use super::*;
use bridge_adapters::agent::SendResult;
use bridge_adapters::FakeAgentGateway;
use std::collections::BTreeMap;
use tempfile::TempDir;

struct Fixture {
    store: Arc<EventStore>,
    agent: Arc<FakeAgentGateway>,
    handler: SchedulerHandler<FakeAgentGateway>,
    settings_path: PathBuf,
    _tmp: TempDir,
}

fn write_settings(path: &Path, schedules: Vec<ScheduleConfig>) {
    let settings = Settings {
        schedules,
        ..Settings::default()
    };
    std::fs::write(path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();
}

fn schedule(name: &str) -> ScheduleConfig {
    ScheduleConfig {
        name: name.to_string(),
        cron: "0 0 9 * * *".to_string(),
        timezone: "UTC".to_string(),
        prompt: "give me the daily digest".to_string(),
        discord_notify: true,
        prompt_file: None,
        skippable: false,
        session_mode: bridge_core::SessionMode::Main,
    }
}

fn fixture(schedules: Vec<ScheduleConfig>) -> Fixture {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("PROMPT.md"), "at {{datetime}}: {{user_input}}").unwrap();
    let settings_path = tmp.path().join("settings.json");
    write_settings(&settings_path, schedules);

    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let agent = Arc::new(FakeAgentGateway::new());
    let agent_config = AgentConfig {
        enable_sandbox: false,
        claude_timeout: Duration::from_secs(60),
        extra_env: BTreeMap::new(),
        system_prompt_path: tmp.path().join("system-prompt.md"),
        project_root: tmp.path().to_path_buf(),
    };

    let handler = SchedulerHandler::new(
        store.clone(),
        agent.clone(),
        agent_config,
        settings_path.clone(),
        tmp.path().join("PROMPT.md"),
        Some("user-1".to_string()),
    );

    Fixture {
        store,
        agent,
        handler,
        settings_path,
        _tmp: tmp,
    }
}

fn payload(name: &str, triggered_at: DateTime<Utc>) -> SchedulerTriggeredPayload {
    SchedulerTriggeredPayload {
        schedule_name: name.to_string(),
        triggered_at,
        expires_at: triggered_at + chrono::Duration::minutes(15),
    }
}

#[tokio::test]
async fn expired_firing_is_terminal_and_never_calls_the_agent() {
    let f = fixture(vec![schedule("daily")]);
    let triggered_at = Utc::now() - chrono::Duration::minutes(20);

    let result = f.handler.handle(&payload("daily", triggered_at)).await;

    assert!(matches!(result, Err(HandlerError::Terminal(_))));
    assert!(f.agent.calls().is_empty());
}

#[tokio::test]
async fn unknown_schedule_name_is_terminal() {
    let f = fixture(vec![schedule("daily")]);

    let result = f.handler.handle(&payload("missing", Utc::now())).await;

    assert!(matches!(result, Err(HandlerError::Terminal(_))));
}

#[tokio::test]
async fn happy_path_publishes_an_outbound_with_a_dedupe_key() {
    let f = fixture(vec![schedule("daily")]);
    f.agent.push_response(Ok(SendResult {
        response: "here's the digest".to_string(),
        session_id: "s".to_string(),
    }));
    let triggered_at = Utc::now();

    f.handler.handle(&payload("daily", triggered_at)).await.unwrap();

    let event = f.store.claim_next("outbound-worker").unwrap().unwrap();
    match event.event_type {
        EventType::OutboundDmRequest(p) => {
            assert_eq!(p.text, "here's the digest");
            assert_eq!(p.user_id.as_deref(), Some("user-1"));
            assert_eq!(p.source, OutboundSource::Scheduler);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(
        event.dedupe_key.as_deref(),
        Some(format!("outbound:schedule:daily:{}", triggered_at.to_rfc3339()).as_str())
    );
}

#[tokio::test]
async fn skippable_response_suppresses_the_outbound() {
    let mut s = schedule("daily");
    s.skippable = true;
    let f = fixture(vec![s]);
    f.agent.push_response(Ok(SendResult {
        response: "[SKIP] nothing new today".to_string(),
        session_id: "s".to_string(),
    }));

    f.handler.handle(&payload("daily", Utc::now())).await.unwrap();

    assert!(f.store.claim_next("outbound-worker").unwrap().is_none());
}

#[tokio::test]
async fn discord_notify_false_suppresses_the_outbound_even_on_success() {
    let mut s = schedule("daily");
    s.discord_notify = false;
    let f = fixture(vec![s]);
    f.agent.push_response(Ok(SendResult {
        response: "here's the digest".to_string(),
        session_id: "s".to_string(),
    }));

    f.handler.handle(&payload("daily", Utc::now())).await.unwrap();

    assert!(f.store.claim_next("outbound-worker").unwrap().is_none());
}

#[tokio::test]
async fn auth_error_with_discord_notify_publishes_the_recovery_message() {
    let f = fixture(vec![schedule("daily")]);
    f.agent
        .push_response(Err(bridge_adapters::agent::AgentError::Auth("Not logged in".to_string())));

    let result = f.handler.handle(&payload("daily", Utc::now())).await;

    assert!(matches!(result, Err(HandlerError::Terminal(_))));
    let event = f.store.claim_next("outbound-worker").unwrap().unwrap();
    match event.event_type {
        EventType::OutboundDmRequest(p) => assert_eq!(p.text, AUTH_RECOVERY_MESSAGE),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn auth_error_without_discord_notify_publishes_nothing() {
    let mut s = schedule("daily");
    s.discord_notify = false;
    let f = fixture(vec![s]);
    f.agent
        .push_response(Err(bridge_adapters::agent::AgentError::Auth("Not logged in".to_string())));

    let result = f.handler.handle(&payload("daily", Utc::now())).await;

    assert!(matches!(result, Err(HandlerError::Terminal(_))));
    assert!(f.store.claim_next("outbound-worker").unwrap().is_none());
}

#[tokio::test]
async fn isolated_session_mode_uses_a_schedule_named_session_target() {
    let mut s = schedule("daily");
    s.session_mode = bridge_core::SessionMode::Isolated;
    let f = fixture(vec![s]);
    f.agent.push_response(Ok(SendResult {
        response: "ok".to_string(),
        session_id: "s".to_string(),
    }));

    f.handler.handle(&payload("daily", Utc::now())).await.unwrap();

    let calls = f.agent.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].options.session_target,
        SessionTarget::Isolated("daily".to_string())
    );
}

#[tokio::test]
async fn prompt_file_overrides_the_inline_prompt() {
    let mut s = schedule("daily");
    let f = fixture(vec![]);
    let prompt_file = f._tmp.path().join("digest_prompt.txt");
    std::fs::write(&prompt_file, "read from file instead").unwrap();
    s.prompt_file = Some(prompt_file.display().to_string());
    write_settings(&f.settings_path, vec![s]);
    f.agent.push_response(Ok(SendResult {
        response: "ok".to_string(),
        session_id: "s".to_string(),
    }));

    f.handler.handle(&payload("daily", Utc::now())).await.unwrap();

    let calls = f.agent.calls();
    assert!(calls[0].prompt_text.contains("read from file instead"));
}

#[tokio::test]
async fn a_successful_run_writes_a_handoff_file() {
    let f = fixture(vec![schedule("daily")]);
    f.agent.push_response(Ok(SendResult {
        response: "logged output".to_string(),
        session_id: "s".to_string(),
    }));
    let triggered_at = Utc::now();

    f.handler.handle(&payload("daily", triggered_at)).await.unwrap();

    let expected = f
        ._tmp
        .path()
        .join("handoffs")
        .join(triggered_at.format("%Y").to_string())
        .join(triggered_at.format("%m").to_string())
        .join(triggered_at.format("%d").to_string())
        .join("daily.md");
    let contents = std::fs::read_to_string(expected).unwrap();
    assert!(contents.contains("logged output"));
}
