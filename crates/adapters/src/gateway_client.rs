// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The gateway-login collaborator driven by `bridge_engine::supervisor`
//! (`spec.md` §4.3 "Connection supervisor"). `GatewayClient` is the seam:
//! `login`/`destroy` plus a lifecycle event stream the supervisor's state
//! machine consumes one event at a time, plus a second stream of inbound
//! DMs the gateway delivers while the connection is healthy (`spec.md` §2
//! "the platform adapter receives a DM ... publishes an `inbound` event",
//! §5 "inbound platform callback") — the live counterpart to
//! `bridge_engine::reconcile`'s recovery paging.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway login failed: {0}")]
    Login(String),
}

/// Lifecycle events the supervisor's state machine reacts to (`spec.md`
/// §4.3 "Registers event handlers").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Ready,
    Error(String),
    ShardError(String),
    ShardDisconnect(String),
    Invalidated,
}

/// A DM delivered over the gateway while the connection is up. Carries
/// only identifiers — the worker re-fetches the message itself, same as a
/// DM replayed by recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDm {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
}

/// `spec.md` §4.3: "generic over a `GatewayClient` trait (`login`,
/// `destroy`, event stream of ...)".
#[async_trait]
pub trait GatewayClient: Send + Sync + 'static {
    async fn login(&self, token: &str) -> Result<(), GatewayError>;

    /// Tears down the current connection; a subsequent `login` starts a
    /// fresh one. Idempotent.
    async fn destroy(&self);

    /// Waits for and returns the next lifecycle event, or `None` once the
    /// client has been destroyed and will not reconnect on its own.
    async fn next_event(&self) -> Option<GatewayEvent>;

    /// Waits for and returns the next DM the gateway delivered. Separate
    /// from `next_event` so the supervisor's reconnect machinery and the
    /// engine's live-ingestion task can each drain their own stream
    /// without racing for the other's messages.
    async fn next_inbound_dm(&self) -> Option<InboundDm>;
}

mod serenity_client {
    use super::*;
    use serenity::all::{Context, EventHandler, GatewayIntents, Ready};
    use serenity::Client;
    use std::sync::Arc;
    use tokio::sync::Mutex as AsyncMutex;
    use tokio::task::JoinHandle;

    struct Forwarder {
        tx: mpsc::UnboundedSender<GatewayEvent>,
        dm_tx: mpsc::UnboundedSender<InboundDm>,
    }

    #[async_trait]
    impl EventHandler for Forwarder {
        async fn ready(&self, _ctx: Context, _data_about_bot: Ready) {
            let _ = self.tx.send(GatewayEvent::Ready);
        }

        async fn resume(&self, _ctx: Context, _event: serenity::model::event::ResumedEvent) {
            let _ = self.tx.send(GatewayEvent::Ready);
        }

        /// `spec.md` §2/§5 "inbound platform callback": DMs only, never a
        /// bot's own messages. Allowlist filtering happens downstream in
        /// the engine, same as recovery's paging.
        async fn message(&self, _ctx: Context, msg: serenity::model::channel::Message) {
            if msg.guild_id.is_some() || msg.author.bot {
                return;
            }
            let _ = self.dm_tx.send(InboundDm {
                message_id: msg.id.to_string(),
                channel_id: msg.channel_id.to_string(),
                author_id: msg.author.id.to_string(),
            });
        }
    }

    /// Wraps `serenity::Client`. Discord's shard-level error/disconnect/
    /// invalid-session signals surface through the client's driving task
    /// completing (successfully or with an error); that completion is
    /// translated into the unified [`GatewayEvent`] set.
    pub struct SerenityGatewayClient {
        events_tx: mpsc::UnboundedSender<GatewayEvent>,
        events_rx: AsyncMutex<mpsc::UnboundedReceiver<GatewayEvent>>,
        dm_tx: mpsc::UnboundedSender<InboundDm>,
        dm_rx: AsyncMutex<mpsc::UnboundedReceiver<InboundDm>>,
        running: AsyncMutex<Option<RunningClient>>,
    }

    struct RunningClient {
        task: JoinHandle<()>,
        shard_manager: Arc<serenity::gateway::ShardManager>,
    }

    impl Default for SerenityGatewayClient {
        fn default() -> Self {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let (dm_tx, dm_rx) = mpsc::unbounded_channel();
            Self {
                events_tx,
                events_rx: AsyncMutex::new(events_rx),
                dm_tx,
                dm_rx: AsyncMutex::new(dm_rx),
                running: AsyncMutex::new(None),
            }
        }
    }

    impl SerenityGatewayClient {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl GatewayClient for SerenityGatewayClient {
        async fn login(&self, token: &str) -> Result<(), GatewayError> {
            let intents = GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT | GatewayIntents::GUILDS;
            let mut client = Client::builder(token, intents)
                .event_handler(Forwarder {
                    tx: self.events_tx.clone(),
                    dm_tx: self.dm_tx.clone(),
                })
                .await
                .map_err(|e| GatewayError::Login(e.to_string()))?;

            let shard_manager = client.shard_manager.clone();
            let tx = self.events_tx.clone();
            let task = tokio::spawn(async move {
                if let Err(e) = client.start().await {
                    let _ = tx.send(GatewayEvent::Invalidated);
                    tracing::warn!(error = %e, "gateway client task exited");
                }
            });

            *self.running.lock().await = Some(RunningClient { task, shard_manager });
            Ok(())
        }

        async fn destroy(&self) {
            if let Some(running) = self.running.lock().await.take() {
                running.shard_manager.shutdown_all().await;
                running.task.abort();
            }
        }

        async fn next_event(&self) -> Option<GatewayEvent> {
            self.events_rx.lock().await.recv().await
        }

        async fn next_inbound_dm(&self) -> Option<InboundDm> {
            self.dm_rx.lock().await.recv().await
        }
    }
}

pub use serenity_client::SerenityGatewayClient;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeGatewayClient;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::Notify;

    struct FakeState {
        login_calls: Vec<String>,
        destroy_calls: u32,
        next_login_error: Option<String>,
        queue: VecDeque<GatewayEvent>,
        dm_queue: VecDeque<InboundDm>,
        destroyed: bool,
    }

    /// Drives the supervisor's state machine deterministically in tests:
    /// `push_event` queues a lifecycle event, `next_event` blocks until one
    /// is available (mirroring the real client's async event stream).
    #[derive(Clone)]
    pub struct FakeGatewayClient {
        state: Arc<Mutex<FakeState>>,
        notify: Arc<Notify>,
    }

    impl Default for FakeGatewayClient {
        fn default() -> Self {
            Self {
                state: Arc::new(Mutex::new(FakeState {
                    login_calls: Vec::new(),
                    destroy_calls: 0,
                    next_login_error: None,
                    queue: VecDeque::new(),
                    dm_queue: VecDeque::new(),
                    destroyed: false,
                })),
                notify: Arc::new(Notify::new()),
            }
        }
    }

    impl FakeGatewayClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn login_calls(&self) -> Vec<String> {
            self.state.lock().login_calls.clone()
        }

        pub fn destroy_call_count(&self) -> u32 {
            self.state.lock().destroy_calls
        }

        pub fn fail_next_login(&self, message: impl Into<String>) {
            self.state.lock().next_login_error = Some(message.into());
        }

        pub fn push_event(&self, event: GatewayEvent) {
            self.state.lock().queue.push_back(event);
            self.notify.notify_waiters();
        }

        pub fn push_inbound_dm(&self, dm: InboundDm) {
            self.state.lock().dm_queue.push_back(dm);
            self.notify.notify_waiters();
        }
    }

    #[async_trait]
    impl GatewayClient for FakeGatewayClient {
        async fn login(&self, token: &str) -> Result<(), GatewayError> {
            let mut state = self.state.lock();
            state.login_calls.push(token.to_string());
            state.destroyed = false;
            if let Some(message) = state.next_login_error.take() {
                return Err(GatewayError::Login(message));
            }
            Ok(())
        }

        async fn destroy(&self) {
            {
                let mut state = self.state.lock();
                state.destroy_calls += 1;
                state.destroyed = true;
            }
            self.notify.notify_waiters();
        }

        async fn next_event(&self) -> Option<GatewayEvent> {
            loop {
                {
                    let mut state = self.state.lock();
                    if let Some(event) = state.queue.pop_front() {
                        return Some(event);
                    }
                    if state.destroyed {
                        return None;
                    }
                }
                self.notify.notified().await;
            }
        }

        async fn next_inbound_dm(&self) -> Option<InboundDm> {
            loop {
                {
                    let mut state = self.state.lock();
                    if let Some(dm) = state.dm_queue.pop_front() {
                        return Some(dm);
                    }
                    if state.destroyed {
                        return None;
                    }
                }
                self.notify.notified().await;
            }
        }
    }
}

#[cfg(test)]
#[path = "gateway_client_tests.rs"]
mod tests;
