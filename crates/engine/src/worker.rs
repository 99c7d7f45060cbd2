// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The event worker (`spec.md` §4.4): one claim/dispatch loop. Readiness is
//! gated on the connection supervisor; outcomes are turned into
//! `mark_done`/`mark_retry`/`mark_dead` calls against the event store.

use async_trait::async_trait;
use bridge_adapters::gateway_client::GatewayClient;
use bridge_core::{backoff_ms, Event, EventId, MAX_ATTEMPTS, STALE_LOCK_TIMEOUT_MS};
use bridge_storage::EventStore;
use std::sync::Arc;
use std::time::Duration;

use crate::supervisor::ConnectionSupervisor;

/// `spec.md` §4.4 step 3: "sleep a short poll interval".
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// `spec.md` §4.4 step 1: "call `wait_until_ready(60 s)`".
pub const READY_TIMEOUT: Duration = Duration::from_secs(60);
/// Refresh cadence for the in-flight lock (`spec.md` §9 open question 1).
pub const LOCK_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Outcome of dispatching one event (`spec.md` §4.4 "Dispatch ... error
/// taxonomy").
#[derive(Debug, Clone)]
pub enum HandlerError {
    /// Do not retry; dead-letter immediately.
    Terminal(String),
    /// Retry using the default backoff schedule.
    Retryable(String),
    /// Retry after a handler-supplied delay instead of the default backoff.
    RetryAfter { error: String, delay_ms: u64 },
}

impl HandlerError {
    fn message(&self) -> &str {
        match self {
            HandlerError::Terminal(m) | HandlerError::Retryable(m) => m,
            HandlerError::RetryAfter { error, .. } => error,
        }
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// Dispatch target the worker hands a claimed event to, one per event type
/// (`spec.md` §4.4 "Dispatch").
#[async_trait]
pub trait EventDispatcher: Send + Sync + 'static {
    async fn dispatch(&self, event: &Event) -> HandlerResult;
}

pub struct EventWorker<G: GatewayClient> {
    store: Arc<EventStore>,
    supervisor: Arc<ConnectionSupervisor<G>>,
    dispatcher: Arc<dyn EventDispatcher>,
    worker_id: String,
}

impl<G: GatewayClient> EventWorker<G> {
    pub fn new(
        store: Arc<EventStore>,
        supervisor: Arc<ConnectionSupervisor<G>>,
        dispatcher: Arc<dyn EventDispatcher>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            supervisor,
            dispatcher,
            worker_id: worker_id.into(),
        }
    }

    /// Runs forever. Intended to be spawned as its own task.
    pub async fn run(&self) {
        loop {
            self.tick().await;
        }
    }

    /// One iteration of `spec.md` §4.4 steps 1-4, split out so tests can
    /// drive it deterministically instead of looping forever.
    pub async fn tick(&self) {
        if !self.supervisor.is_ready() {
            self.supervisor.wait_until_ready(READY_TIMEOUT).await;
            return;
        }

        if let Err(e) = self.store.requeue_stale_processing(STALE_LOCK_TIMEOUT_MS) {
            tracing::warn!(error = %e, "requeue_stale_processing failed");
        }

        let event = match self.store.claim_next(&self.worker_id) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tokio::time::sleep(POLL_INTERVAL).await;
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "claim_next failed");
                tokio::time::sleep(POLL_INTERVAL).await;
                return;
            }
        };

        self.process(event).await;
    }

    async fn process(&self, event: Event) {
        let type_name = event.event_type.type_name();
        let id = event.id.clone();
        let attempt = event.attempt_count;

        let lock_refresh = self.spawn_lock_refresh(id.clone());
        let outcome = self.dispatcher.dispatch(&event).await;
        lock_refresh.abort();

        match outcome {
            Ok(()) => {
                if let Err(e) = self.store.mark_done(&id) {
                    tracing::error!(error = %e, event_id = %id, "mark_done failed");
                }
            }
            Err(err) => self.apply_failure(&id, type_name, attempt, err),
        }
    }

    /// Keeps `touch_lock` refreshed while a dispatch is in flight so long
    /// agent calls aren't reclaimed by `requeue_stale_processing`.
    fn spawn_lock_refresh(&self, id: EventId) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let worker_id = self.worker_id.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(LOCK_REFRESH_INTERVAL).await;
                if let Err(e) = store.touch_lock(&id, &worker_id) {
                    tracing::warn!(error = %e, event_id = %id, "touch_lock failed");
                }
            }
        })
    }

    fn apply_failure(&self, id: &EventId, type_name: &str, attempt: u32, err: HandlerError) {
        let message = err.message().to_string();
        tracing::warn!(event_id = %id, event_type = type_name, attempt, error = %message, "dispatch failed");

        let delay_ms = match err {
            HandlerError::Terminal(_) => {
                if let Err(e) = self.store.mark_dead(id, &message) {
                    tracing::error!(error = %e, event_id = %id, "mark_dead failed");
                }
                return;
            }
            HandlerError::Retryable(_) => backoff_ms(attempt + 1),
            HandlerError::RetryAfter { delay_ms, .. } => delay_ms,
        };

        if attempt + 1 >= MAX_ATTEMPTS {
            if let Err(e) = self.store.mark_dead(id, "max attempts reached") {
                tracing::error!(error = %e, event_id = %id, "mark_dead failed");
            }
            return;
        }

        if let Err(e) = self.store.mark_retry(id, &message, delay_ms) {
            tracing::error!(error = %e, event_id = %id, "mark_retry failed");
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
