use super::*;
use bridge_adapters::gateway_client::{FakeGatewayClient, InboundDm};

fn fixture() -> (Arc<EventStore>, Arc<FakeGatewayClient>, LiveIngest<FakeGatewayClient>) {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let client = Arc::new(FakeGatewayClient::new());
    let ingest = LiveIngest::new(store.clone(), client.clone(), vec!["user-1".to_string()]);
    (store, client, ingest)
}

#[test]
fn handle_publishes_dm_incoming_for_an_allowlisted_user() {
    let (store, _client, ingest) = fixture();

    ingest.handle("42", "chan-1", "user-1").unwrap();

    let event = store.claim_next("worker").unwrap().unwrap();
    match event.event_type {
        EventType::DmIncoming(p) => {
            assert_eq!(p.message_id, "42");
            assert_eq!(p.channel_id, "chan-1");
            assert_eq!(p.author_id, "user-1");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(event.lane, Lane::Interactive);
    assert_eq!(event.priority, 15);
    assert_eq!(store.get_offset(&offset_scope("user-1")).unwrap(), Some("42".to_string()));
}

#[test]
fn handle_ignores_a_user_not_on_the_allowlist() {
    let (store, _client, ingest) = fixture();

    ingest.handle("42", "chan-1", "someone-else").unwrap();

    assert!(store.claim_next("worker").unwrap().is_none());
    assert_eq!(store.get_offset(&offset_scope("someone-else")).unwrap(), None);
}

#[test]
fn handle_does_not_double_publish_a_message_already_queued_by_recovery() {
    let (store, _client, ingest) = fixture();
    store
        .publish(
            EventInput::new(
                EventType::DmIncoming(DmIncomingPayload {
                    message_id: "42".to_string(),
                    channel_id: "chan-1".to_string(),
                    author_id: "user-1".to_string(),
                }),
                Lane::Recovery,
                5,
            )
            .with_dedupe_key(dm_incoming_dedupe_key("42")),
        )
        .unwrap();

    ingest.handle("42", "chan-1", "user-1").unwrap();

    let first = store.claim_next("worker").unwrap();
    assert!(first.is_some());
    assert!(store.claim_next("worker").unwrap().is_none());
}

#[tokio::test]
async fn run_drains_the_gateway_stream_and_stops_once_destroyed() {
    let (store, client, ingest) = fixture();
    client.push_inbound_dm(InboundDm {
        message_id: "42".to_string(),
        channel_id: "chan-1".to_string(),
        author_id: "user-1".to_string(),
    });
    client.destroy().await;

    ingest.run().await;

    assert!(store.claim_next("worker").unwrap().is_some());
}
