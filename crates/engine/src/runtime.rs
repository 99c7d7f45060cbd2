// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Wires the engine's handlers and background tasks into one running
//! process. Generic over the three collaborator traits, mirroring the
//! teacher's `Runtime<S, A, N, C>`: the binary picks the concrete types
//! (real or fake) and hands them to [`Runtime::new`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_adapters::agent::{AgentConfig, AgentGateway};
use bridge_adapters::gateway_client::GatewayClient;
use bridge_adapters::platform::PlatformAdapter;
use bridge_adapters::session_files::SessionStore;
use bridge_core::{Env, Event, EventType, Settings};
use bridge_storage::EventStore;

use crate::dm_handler::DmHandler;
use crate::ingest::LiveIngest;
use crate::outbound::OutboundSender;
use crate::reconcile::{ReconcileHandler, ReconcileScheduler};
use crate::scheduler::{SchedulerHandler, SchedulerRegistrar};
use crate::supervisor::ConnectionSupervisor;
use crate::worker::{EventDispatcher, EventWorker, HandlerResult};

/// `spec.md` §4.6 "Otherwise: send a configured fallback message".
const OUTBOUND_FALLBACK_MESSAGE: &str =
    "Sorry, something went wrong processing that reply and there was nothing to send.";

/// Persisted-state layout under one base directory (`spec.md` §6
/// "Persisted state", renamed from the original `tmp/cc-discord-bot/` to
/// `tmp/cc-bridge/` for this project). `project_root` doubles as the agent
/// CLI's sandbox workspace, since nothing else in `Settings`/`Env` names a
/// separate one and `handoffs/` is specified to live under the same base
/// directory as everything else here.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base_dir: PathBuf,
}

impl Paths {
    pub fn under(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn event_store(&self) -> PathBuf {
        self.base_dir.join("event-bus.sqlite3")
    }

    pub fn sandbox_id_file(&self) -> PathBuf {
        self.base_dir.join("sandbox_id.txt")
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.base_dir.join("attachments")
    }

    pub fn session_base(&self) -> PathBuf {
        self.base_dir.clone()
    }

    pub fn system_prompt_path(&self) -> PathBuf {
        self.base_dir.join("system-prompt.md")
    }

    pub fn prompt_template_path(&self) -> PathBuf {
        self.base_dir.join("PROMPT.md")
    }

    pub fn project_root(&self) -> PathBuf {
        self.base_dir.clone()
    }
}

/// Routes each claimed event to the one handler that owns its type
/// (`spec.md` §4.4 "Dispatch").
struct RootDispatcher<P: PlatformAdapter, A: AgentGateway> {
    dm_handler: Arc<DmHandler<P, A>>,
    outbound: Arc<OutboundSender<P>>,
    scheduler: Arc<SchedulerHandler<A>>,
    reconcile: Arc<ReconcileHandler<P>>,
}

#[async_trait]
impl<P: PlatformAdapter, A: AgentGateway> EventDispatcher for RootDispatcher<P, A> {
    async fn dispatch(&self, event: &Event) -> HandlerResult {
        match &event.event_type {
            EventType::DmIncoming(payload) => self.dm_handler.handle(payload).await,
            EventType::OutboundDmRequest(payload) => self.outbound.handle(payload).await,
            EventType::SchedulerTriggered(payload) => self.scheduler.handle(payload).await,
            EventType::DmRecoverRun(payload) => self.reconcile.recover(payload).await,
            EventType::DmReconcileRun(payload) => self.reconcile.reconcile(payload).await,
        }
    }
}

/// The assembled daemon: one worker loop, the connection supervisor, the
/// scheduler's cron timers, and the reconcile/recovery timers, all sharing
/// one [`EventStore`].
pub struct Runtime<G: GatewayClient, P: PlatformAdapter, A: AgentGateway> {
    supervisor: Arc<ConnectionSupervisor<G>>,
    worker: EventWorker<G>,
    store: Arc<EventStore>,
    dispatcher: Arc<dyn EventDispatcher>,
    scheduler_registrar: SchedulerRegistrar,
    reconcile_scheduler: ReconcileScheduler<G>,
    live_ingest: Arc<LiveIngest<G>>,
    bot_token: String,
    /// Reachable through `dispatcher` too, kept here so the `schedule
    /// <name>` CLI command can invoke `run_schedule` directly, outside the
    /// queue.
    pub scheduler_handler: Arc<SchedulerHandler<A>>,
    _platform: std::marker::PhantomData<P>,
}

impl<G: GatewayClient, P: PlatformAdapter, A: AgentGateway> Runtime<G, P, A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<EventStore>,
        gateway_client: Arc<G>,
        platform: Arc<P>,
        agent: Arc<A>,
        sessions: SessionStore,
        env: &Env,
        settings: &Settings,
        settings_path: PathBuf,
        paths: &Paths,
    ) -> Self {
        let live_ingest =
            Arc::new(LiveIngest::new(store.clone(), gateway_client.clone(), env.allowed_user_ids.clone()));

        let supervisor = Arc::new(ConnectionSupervisor::new(
            gateway_client,
            Duration::from_secs(settings.discord_connection_heartbeat_interval_seconds as u64),
            Duration::from_secs(settings.discord_connection_reconnect_grace_seconds as u64),
        ));

        let agent_config = AgentConfig {
            enable_sandbox: settings.enable_sandbox,
            claude_timeout: Duration::from_secs(settings.claude_timeout_seconds as u64),
            extra_env: settings.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            system_prompt_path: paths.system_prompt_path(),
            project_root: paths.project_root(),
        };

        // `spec.md` §1 OVERVIEW: schedule results go to the same chat
        // channel as interactive DMs — the first configured allowed user.
        let notify_user_id = env.allowed_user_ids.first().cloned();

        let dm_handler = Arc::new(DmHandler::new(
            store.clone(),
            platform.clone(),
            agent.clone(),
            sessions,
            agent_config.clone(),
            settings.bypass_mode,
            paths.prompt_template_path(),
            paths.attachments_dir(),
        ));

        let outbound = Arc::new(OutboundSender::new(platform.clone(), OUTBOUND_FALLBACK_MESSAGE));

        let scheduler_handler = Arc::new(SchedulerHandler::new(
            store.clone(),
            agent,
            agent_config,
            settings_path,
            paths.prompt_template_path(),
            notify_user_id,
        ));

        let reconcile_handler =
            Arc::new(ReconcileHandler::new(store.clone(), platform, env.allowed_user_ids.clone()));

        let dispatcher: Arc<dyn EventDispatcher> = Arc::new(RootDispatcher {
            dm_handler,
            outbound,
            scheduler: scheduler_handler.clone(),
            reconcile: reconcile_handler,
        });

        let worker = EventWorker::new(store.clone(), supervisor.clone(), dispatcher.clone(), "worker-1");
        let scheduler_registrar = SchedulerRegistrar::new(store.clone(), settings.schedules.clone());
        let reconcile_scheduler = ReconcileScheduler::new(store.clone(), supervisor.clone());

        Self {
            supervisor,
            worker,
            store,
            dispatcher,
            scheduler_registrar,
            reconcile_scheduler,
            live_ingest,
            bot_token: env.bot_token.clone(),
            scheduler_handler,
            _platform: std::marker::PhantomData,
        }
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor<G>> {
        &self.supervisor
    }

    /// Dispatches one event directly, bypassing the worker's claim loop.
    /// Lets tests exercise routing without a live supervisor/poll loop.
    pub async fn dispatch(&self, event: &Event) -> HandlerResult {
        self.dispatcher.dispatch(event).await
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Spawns every background task (supervisor event pump plus its own
    /// reconnect/heartbeat drivers, the worker loop, the scheduler's cron
    /// timers, the reconcile timer, the recovery watcher) and runs until
    /// the supervisor stops. Intended to be raced against a shutdown
    /// signal by the caller (`spec.md` §5 "Cancellation").
    pub async fn run(self) {
        let Runtime {
            supervisor,
            worker,
            scheduler_registrar,
            reconcile_scheduler,
            live_ingest,
            bot_token,
            ..
        } = self;

        let mut handles = Vec::new();
        handles.extend(scheduler_registrar.spawn_all());
        handles.extend(reconcile_scheduler.spawn());

        let worker_task = tokio::spawn(async move {
            worker.run().await;
        });

        let ingest_task = tokio::spawn(async move {
            live_ingest.run().await;
        });

        supervisor.run(&bot_token).await;

        worker_task.abort();
        ingest_task.abort();
        for handle in handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
