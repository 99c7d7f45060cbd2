// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Entry point: parses the CLI surface, sets up logging, and either runs
//! the full pipeline or performs a one-off action against the same SQLite
//! file the running daemon uses.

mod cli;
mod env;

use std::path::PathBuf;
use std::sync::Arc;

use bridge_adapters::agent::sandbox::{CliSandboxTool, SandboxCell};
use bridge_adapters::agent::{AgentConfig, ClaudeAgentGateway};
use bridge_adapters::gateway_client::SerenityGatewayClient;
use bridge_adapters::platform::SerenityPlatformAdapter;
use bridge_adapters::session_files::SessionStore;
use bridge_core::{Env as EngineEnv, EventInput, EventType, Lane, OutboundDmRequestPayload, OutboundFile, OutboundSource, Settings};
use bridge_engine::{Paths, Runtime};
use bridge_storage::EventStore;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;

/// `spec.md` §6 "Exit codes: 0 on success, 1 on input/validation error or
/// failed boot", mirroring `oj-daemon::main`'s exit-code discipline.
#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let cli = Cli::parse();
    let paths = Paths::under(env::state_dir());

    match cli.command() {
        Command::Daemon => run_daemon(&paths).await,
        Command::Send { user_id, file, message, json } => run_send(&paths, user_id, file, message, json),
        Command::Schedule { name, json } => run_schedule(&paths, name, json).await,
    }
}

fn init_logging(paths: &Paths) -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = paths.base_dir.join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::never(&log_dir, "bridge-daemon.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    guard
}

async fn run_daemon(paths: &Paths) -> i32 {
    let _guard = init_logging(paths);

    let engine_env = match EngineEnv::from_environ() {
        Ok(env) => env,
        Err(e) => {
            tracing::error!(error = %e, "failed to load environment");
            return 1;
        }
    };

    if let Some(parent) = paths.event_store().parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!(error = %e, "failed to create state directory");
            return 1;
        }
    }

    let settings_path = env::settings_path();
    let settings = match Settings::load(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, path = %settings_path.display(), "failed to load settings");
            return 1;
        }
    };

    let store = match EventStore::open(&paths.event_store()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "failed to open event store");
            return 1;
        }
    };

    let gateway_client = Arc::new(SerenityGatewayClient::new());
    let http = Arc::new(serenity::http::Http::new(&engine_env.bot_token));
    let platform = Arc::new(SerenityPlatformAdapter::new(http));

    let sessions = SessionStore::new(paths.session_base());
    let sandbox_cell = SandboxCell::new(paths.sandbox_id_file());
    let sandbox_tool = Arc::new(CliSandboxTool::default());
    let agent = Arc::new(ClaudeAgentGateway::new(sandbox_cell, sandbox_tool, sessions.clone()));

    let runtime = Runtime::new(
        store,
        gateway_client,
        platform,
        agent,
        sessions,
        &engine_env,
        &settings,
        settings_path,
        paths,
    );

    tracing::info!("bridge-daemon starting");

    tokio::select! {
        _ = runtime.run() => {}
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    0
}

async fn shutdown_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

fn run_send(paths: &Paths, user_id: String, files: Vec<PathBuf>, message: Option<String>, json: bool) -> i32 {
    let text = message.unwrap_or_default();
    if text.is_empty() && files.is_empty() {
        eprintln!("send: provide a message, at least one --file, or both");
        return 1;
    }

    let mut outbound_files = Vec::new();
    for path in &files {
        if !path.is_file() {
            eprintln!("send: file not found: {}", path.display());
            return 1;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        outbound_files.push(OutboundFile { path: path.display().to_string(), name });
    }

    let store = match EventStore::open(&paths.event_store()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("send: failed to open event store: {e}");
            return 1;
        }
    };

    let payload = OutboundDmRequestPayload {
        request_id: bridge_core::EventId::generate().to_string(),
        source: OutboundSource::ManualSend,
        text,
        user_id: Some(user_id.clone()),
        channel_id: None,
        files: outbound_files,
        context: None,
    };

    // `dm_handler.rs::publish_outbound`'s lane/priority convention for
    // user-facing outbound.
    let event_id = match store.publish(EventInput::new(EventType::OutboundDmRequest(payload), Lane::Interactive, 15)) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("send: failed to enqueue: {e}");
            return 1;
        }
    };

    if json {
        println!("{}", serde_json::json!({"event_id": event_id.to_string(), "user_id": user_id}));
    } else {
        println!("enqueued outbound message {event_id} for {user_id}");
    }
    0
}

async fn run_schedule(paths: &Paths, name: String, json: bool) -> i32 {
    let settings_path = env::settings_path();
    let settings = match Settings::load(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("schedule: failed to load settings: {e}");
            return 1;
        }
    };

    let schedule = match settings.schedules.iter().find(|s| s.name == name) {
        Some(schedule) => schedule.clone(),
        None => {
            eprintln!("schedule: no such schedule: {name}");
            return 1;
        }
    };

    let store = match EventStore::open(&paths.event_store()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("schedule: failed to open event store: {e}");
            return 1;
        }
    };

    let sessions = SessionStore::new(paths.session_base());
    let sandbox_cell = SandboxCell::new(paths.sandbox_id_file());
    let sandbox_tool = Arc::new(CliSandboxTool::default());
    let agent = Arc::new(ClaudeAgentGateway::new(sandbox_cell, sandbox_tool, sessions));

    let agent_config = AgentConfig {
        enable_sandbox: settings.enable_sandbox,
        claude_timeout: std::time::Duration::from_secs(settings.claude_timeout_seconds as u64),
        extra_env: settings.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        system_prompt_path: paths.system_prompt_path(),
        project_root: paths.project_root(),
    };

    let handler = bridge_engine::SchedulerHandler::new(
        store,
        agent,
        agent_config,
        settings_path,
        paths.prompt_template_path(),
        None,
    );

    match handler.run_schedule(&schedule, chrono::Utc::now()).await {
        Ok(outcome) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({"response": outcome.response, "skipped": outcome.skipped})
                );
            } else if outcome.skipped {
                println!("schedule {name} produced a skip response");
            } else {
                println!("{}", outcome.response);
            }
            0
        }
        Err(e) => {
            eprintln!("schedule: {e}");
            1
        }
    }
}
