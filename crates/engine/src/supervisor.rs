// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The connection-health supervisor (`spec.md` §4.3). A state machine over
//! a [`bridge_adapters::gateway_client::GatewayClient`]: one task pumps
//! lifecycle events, a second drives the single-flight reconnect loop, a
//! third fires the heartbeat tick.

use bridge_adapters::gateway_client::{GatewayClient, GatewayEvent};
use bridge_core::backoff::backoff_ms;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// `spec.md` §4.3 "increments attempt (capped at 10)".
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// `spec.md` §4.3 "three consecutive ticks with round-trip ping above 15s".
pub const HEARTBEAT_UNHEALTHY_TICKS: u32 = 3;
pub const HEARTBEAT_PING_THRESHOLD_MS: u64 = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Ready,
    Reconnecting,
    Stopping,
}

/// `spec.md` §4.3 "generic over a `GatewayClient` trait".
pub struct ConnectionSupervisor<G: GatewayClient> {
    client: Arc<G>,
    state: Mutex<SupervisorState>,
    ready_notify: Notify,
    reconnect_notify: Notify,
    reconnect_pending: AtomicBool,
    reconnect_in_flight: AtomicBool,
    attempt: AtomicU32,
    slow_ping_ticks: AtomicU32,
    ready_generation: AtomicU32,
    heartbeat_interval: Duration,
    reconnect_grace: Duration,
}

impl<G: GatewayClient> ConnectionSupervisor<G> {
    pub fn new(client: Arc<G>, heartbeat_interval: Duration, reconnect_grace: Duration) -> Self {
        Self {
            client,
            state: Mutex::new(SupervisorState::Starting),
            ready_notify: Notify::new(),
            reconnect_notify: Notify::new(),
            reconnect_pending: AtomicBool::new(false),
            reconnect_in_flight: AtomicBool::new(false),
            attempt: AtomicU32::new(0),
            slow_ping_ticks: AtomicU32::new(0),
            ready_generation: AtomicU32::new(0),
            heartbeat_interval,
            reconnect_grace,
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SupervisorState::Ready
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Bumped every time the connection becomes `Ready` — the initial login
    /// and every successful reconnect (`spec.md` §4.8 "on `ready` and on any
    /// reconnect-success"). Recovery sweeps watch this instead of raw state
    /// so they see every transition, not just the current one.
    pub fn ready_generation(&self) -> u32 {
        self.ready_generation.load(Ordering::SeqCst)
    }

    /// Blocks until `ready_generation()` differs from `last_seen`, returning
    /// the new value.
    pub async fn wait_for_next_ready(&self, last_seen: u32) -> u32 {
        loop {
            let gen = self.ready_generation();
            if gen != last_seen {
                return gen;
            }
            self.ready_notify.notified().await;
        }
    }

    fn set_state(&self, state: SupervisorState) {
        *self.state.lock() = state;
        self.ready_notify.notify_waiters();
    }

    /// `spec.md` §4.4 step 1: "call `wait_until_ready(60 s)`".
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state() {
                SupervisorState::Ready => return true,
                SupervisorState::Stopping => return false,
                _ => {}
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let _ = tokio::time::timeout(remaining, self.ready_notify.notified()).await;
        }
    }

    /// Collapses concurrent reconnect requests into one pending flag
    /// (`spec.md` §9 "Connection supervisor as a state machine").
    pub fn request_reconnect(&self) {
        self.reconnect_pending.store(true, Ordering::SeqCst);
        self.reconnect_notify.notify_waiters();
    }

    /// Feeds a measured gateway round-trip into the unhealthy-ping counter
    /// the heartbeat checks.
    pub fn record_ping_sample(&self, round_trip: Duration) {
        if round_trip.as_millis() as u64 > HEARTBEAT_PING_THRESHOLD_MS {
            self.slow_ping_ticks.fetch_add(1, Ordering::SeqCst);
        } else {
            self.slow_ping_ticks.store(0, Ordering::SeqCst);
        }
    }

    /// Applies one lifecycle event (`spec.md` §4.3 "Registers event
    /// handlers"). Exposed standalone so tests can drive the state machine
    /// without running the full event-pump loop.
    pub fn handle_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready => {
                self.attempt.store(0, Ordering::SeqCst);
                self.ready_generation.fetch_add(1, Ordering::SeqCst);
                self.set_state(SupervisorState::Ready);
            }
            GatewayEvent::Error(reason) | GatewayEvent::ShardError(reason) | GatewayEvent::ShardDisconnect(reason) => {
                tracing::warn!(%reason, "gateway reported a recoverable failure");
                self.request_reconnect();
            }
            GatewayEvent::Invalidated => {
                self.set_state(SupervisorState::Stopping);
            }
        }
    }

    /// `spec.md` §4.3 "Heartbeat": true if this tick should force a
    /// reconnect. Skips while a reconnect is already running.
    pub fn heartbeat_tick(&self) -> bool {
        if self.reconnect_in_flight.load(Ordering::SeqCst) {
            return false;
        }
        !self.is_ready() || self.slow_ping_ticks.load(Ordering::SeqCst) >= HEARTBEAT_UNHEALTHY_TICKS
    }

    /// Runs the single-flight reconnect algorithm once end-to-end
    /// (`spec.md` §4.3 "Reconnect loop"): backoff, destroy, login, wait for
    /// readiness within the grace window, looping while more requests
    /// accumulated in the meantime.
    pub async fn reconnect_loop(&self, token: &str) {
        if self.reconnect_in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(SupervisorState::Reconnecting);

        while self.reconnect_pending.swap(false, Ordering::SeqCst) {
            let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
            let capped_attempt = attempt.min(MAX_RECONNECT_ATTEMPTS);
            tokio::time::sleep(Duration::from_millis(backoff_ms(capped_attempt))).await;

            self.client.destroy().await;
            if let Err(e) = self.client.login(token).await {
                tracing::warn!(error = %e, "reconnect login failed");
                self.reconnect_pending.store(true, Ordering::SeqCst);
                continue;
            }

            if self.wait_until_ready(self.reconnect_grace).await {
                break;
            }
            self.reconnect_pending.store(true, Ordering::SeqCst);
        }

        self.reconnect_in_flight.store(false, Ordering::SeqCst);
    }

    async fn reconnect_driver(self: Arc<Self>, token: String) {
        loop {
            self.reconnect_notify.notified().await;
            if self.state() == SupervisorState::Stopping {
                return;
            }
            self.reconnect_loop(&token).await;
        }
    }

    async fn heartbeat_driver(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        loop {
            ticker.tick().await;
            if self.state() == SupervisorState::Stopping {
                return;
            }
            if self.heartbeat_tick() {
                self.request_reconnect();
            }
        }
    }

    /// Drives the supervisor until the gateway client reports
    /// [`GatewayEvent::Invalidated`] or its event stream ends. Spawns the
    /// reconnect and heartbeat tasks for the duration of the run.
    pub async fn run(self: Arc<Self>, token: &str) {
        if let Err(e) = self.client.login(token).await {
            tracing::warn!(error = %e, "initial gateway login failed");
            self.request_reconnect();
        }

        let reconnect_task = tokio::spawn(self.clone().reconnect_driver(token.to_string()));
        let heartbeat_task = tokio::spawn(self.clone().heartbeat_driver());

        loop {
            match self.client.next_event().await {
                Some(event) => {
                    let stopping = matches!(event, GatewayEvent::Invalidated);
                    self.handle_event(event);
                    if stopping {
                        break;
                    }
                }
                None => {
                    self.set_state(SupervisorState::Stopping);
                    break;
                }
            }
        }

        reconnect_task.abort();
        heartbeat_task.abort();
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
