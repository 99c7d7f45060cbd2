// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

use super::*;
use bridge_adapters::gateway_client::FakeGatewayClient;
use std::time::Duration;

fn supervisor() -> (Arc<ConnectionSupervisor<FakeGatewayClient>>, Arc<FakeGatewayClient>) {
    let client = Arc::new(FakeGatewayClient::new());
    let supervisor = Arc::new(ConnectionSupervisor::new(
        client.clone(),
        Duration::from_secs(60),
        Duration::from_secs(5),
    ));
    (supervisor, client)
}

#[tokio::test]
async fn starts_not_ready_and_becomes_ready_on_the_ready_event() {
    let (supervisor, _client) = supervisor();
    assert_eq!(supervisor.state(), SupervisorState::Starting);

    supervisor.handle_event(GatewayEvent::Ready);

    assert_eq!(supervisor.state(), SupervisorState::Ready);
    assert!(supervisor.is_ready());
}

#[tokio::test]
async fn error_events_request_a_reconnect_without_changing_state_directly() {
    let (supervisor, _client) = supervisor();
    supervisor.handle_event(GatewayEvent::Ready);

    supervisor.handle_event(GatewayEvent::ShardError("boom".to_string()));

    // handle_event only requests a reconnect; the state transitions to
    // `Reconnecting` once `reconnect_loop` actually runs.
    assert_eq!(supervisor.state(), SupervisorState::Ready);
}

#[tokio::test]
async fn invalidated_moves_to_stopping_and_unblocks_waiters() {
    let (supervisor, _client) = supervisor();
    let waiter = supervisor.clone();
    let handle = tokio::spawn(async move { waiter.wait_until_ready(Duration::from_secs(10)).await });

    tokio::task::yield_now().await;
    supervisor.handle_event(GatewayEvent::Invalidated);

    assert!(!handle.await.unwrap());
    assert_eq!(supervisor.state(), SupervisorState::Stopping);
}

#[tokio::test]
async fn wait_until_ready_times_out_when_nothing_happens() {
    let (supervisor, _client) = supervisor();
    let ready = supervisor.wait_until_ready(Duration::from_millis(20)).await;
    assert!(!ready);
}

#[tokio::test(start_paused = true)]
async fn reconnect_loop_logs_in_again_and_resets_the_attempt_counter_on_success() {
    let (supervisor, client) = supervisor();
    client.push_event(GatewayEvent::Ready);
    supervisor.request_reconnect();

    let supervisor2 = supervisor.clone();
    let task = tokio::spawn(async move { supervisor2.reconnect_loop("tok").await });
    task.await.unwrap();

    assert_eq!(supervisor.attempt_count(), 0);
    assert_eq!(client.login_calls(), vec!["tok".to_string()]);
    assert_eq!(client.destroy_call_count(), 1);
}

#[tokio::test]
async fn heartbeat_tick_forces_reconnect_when_not_ready() {
    let (supervisor, _client) = supervisor();
    assert!(supervisor.heartbeat_tick());
}

#[tokio::test]
async fn heartbeat_tick_skips_while_a_reconnect_is_already_running() {
    let (supervisor, client) = supervisor();
    client.push_event(GatewayEvent::Ready);

    let supervisor2 = supervisor.clone();
    let task = tokio::spawn(async move { supervisor2.reconnect_loop("tok").await });

    // Give the reconnect task a chance to flip `reconnect_in_flight`.
    tokio::task::yield_now().await;
    assert!(!supervisor.heartbeat_tick());

    task.await.unwrap();
}

#[tokio::test]
async fn slow_ping_samples_accumulate_and_reset() {
    let (supervisor, _client) = supervisor();
    supervisor.handle_event(GatewayEvent::Ready);

    supervisor.record_ping_sample(Duration::from_secs(16));
    supervisor.record_ping_sample(Duration::from_secs(16));
    assert!(!supervisor.heartbeat_tick());
    supervisor.record_ping_sample(Duration::from_secs(16));
    assert!(supervisor.heartbeat_tick());

    supervisor.record_ping_sample(Duration::from_secs(1));
    assert!(!supervisor.heartbeat_tick());
}
