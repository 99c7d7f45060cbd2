use super::*;
use bridge_adapters::gateway_client::{FakeGatewayClient, GatewayEvent};
use bridge_core::{DmIncomingPayload, EventInput, EventType, Lane};
use parking_lot::Mutex;
use std::collections::VecDeque;

struct FakeDispatcher {
    responses: Mutex<VecDeque<HandlerResult>>,
    calls: Mutex<Vec<EventId>>,
}

impl FakeDispatcher {
    fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, result: HandlerResult) {
        self.responses.lock().push_back(result);
    }
}

#[async_trait]
impl EventDispatcher for FakeDispatcher {
    async fn dispatch(&self, event: &Event) -> HandlerResult {
        self.calls.lock().push(event.id.clone());
        self.responses.lock().pop_front().unwrap_or(Ok(()))
    }
}

fn dm_incoming(message_id: &str) -> EventInput {
    EventInput::new(
        EventType::DmIncoming(DmIncomingPayload {
            message_id: message_id.to_string(),
            channel_id: "chan".to_string(),
            author_id: "111111111111111111".to_string(),
        }),
        Lane::Interactive,
        15,
    )
}

async fn ready_worker(dispatcher: Arc<FakeDispatcher>) -> (EventWorker<FakeGatewayClient>, Arc<EventStore>) {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let client = Arc::new(FakeGatewayClient::new());
    let supervisor = Arc::new(ConnectionSupervisor::new(
        client,
        Duration::from_secs(60),
        Duration::from_secs(5),
    ));
    supervisor.handle_event(GatewayEvent::Ready);
    let worker = EventWorker::new(store.clone(), supervisor, dispatcher, "worker-1");
    (worker, store)
}

#[tokio::test]
async fn tick_waits_for_readiness_instead_of_claiming_when_not_ready() {
    let dispatcher = Arc::new(FakeDispatcher::new());
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let client = Arc::new(FakeGatewayClient::new());
    let supervisor = Arc::new(ConnectionSupervisor::new(
        client,
        Duration::from_secs(60),
        Duration::from_secs(5),
    ));
    let worker = EventWorker::new(store.clone(), supervisor, dispatcher.clone(), "worker-1");
    store.publish(dm_incoming("1")).unwrap();

    // Readiness wait inside `tick` would block for `READY_TIMEOUT` (60s);
    // race it against a short timeout to prove it doesn't fall through to
    // `claim_next` immediately.
    let raced = tokio::time::timeout(Duration::from_millis(50), worker.tick()).await;
    assert!(raced.is_err());
    assert!(dispatcher.calls.lock().is_empty());
}

#[tokio::test]
async fn successful_dispatch_marks_the_event_done() {
    let dispatcher = Arc::new(FakeDispatcher::new());
    dispatcher.push(Ok(()));
    let (worker, store) = ready_worker(dispatcher.clone()).await;
    let id = store.publish(dm_incoming("1")).unwrap();

    worker.tick().await;

    assert_eq!(dispatcher.calls.lock().clone(), vec![id]);
    // `done` rows are never claimable again.
    assert!(store.claim_next("worker-2").unwrap().is_none());
}

#[tokio::test]
async fn terminal_error_dead_letters_without_retrying() {
    let dispatcher = Arc::new(FakeDispatcher::new());
    dispatcher.push(Err(HandlerError::Terminal("unknown channel".to_string())));
    let (worker, store) = ready_worker(dispatcher).await;
    store.publish(dm_incoming("1")).unwrap();

    worker.tick().await;

    // requeue_stale_processing would otherwise resurrect a `processing` row;
    // a dead-lettered one must not come back through claim_next.
    assert!(store.claim_next("worker-2").unwrap().is_none());
}

#[tokio::test]
async fn retryable_error_schedules_a_retry_with_default_backoff() {
    let dispatcher = Arc::new(FakeDispatcher::new());
    dispatcher.push(Err(HandlerError::Retryable("transient".to_string())));
    let (worker, store) = ready_worker(dispatcher).await;
    store.publish(dm_incoming("1")).unwrap();

    worker.tick().await;

    // Not immediately claimable: `mark_retry` pushes `available_at` into
    // the future by `backoff_ms(1)` = 1s.
    assert!(store.claim_next("worker-2").unwrap().is_none());
}

#[tokio::test]
async fn retry_after_uses_the_handlers_advisory_delay() {
    let dispatcher = Arc::new(FakeDispatcher::new());
    dispatcher.push(Err(HandlerError::RetryAfter {
        error: "rate limited".to_string(),
        delay_ms: 0,
    }));
    let (worker, store) = ready_worker(dispatcher).await;
    store.publish(dm_incoming("1")).unwrap();

    worker.tick().await;

    // `delay_ms: 0` makes the row immediately claimable again, proving the
    // advisory delay overrode the default backoff.
    assert!(store.claim_next("worker-2").unwrap().is_some());
}

#[tokio::test]
async fn retryable_error_at_max_attempts_dead_letters_instead() {
    let dispatcher = Arc::new(FakeDispatcher::new());
    let (worker, store) = ready_worker(dispatcher.clone()).await;
    let id = store.publish(dm_incoming("1")).unwrap();

    // Drive attempt_count up to MAX_ATTEMPTS - 1 via direct retries.
    for _ in 0..(MAX_ATTEMPTS - 1) {
        store.mark_retry(&id, "retry", 0).unwrap();
    }

    dispatcher.push(Err(HandlerError::Retryable("still failing".to_string())));
    worker.tick().await;

    assert!(store.claim_next("worker-2").unwrap().is_none());
}
