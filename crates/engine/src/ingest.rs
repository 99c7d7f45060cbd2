// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Live DM ingestion (`spec.md` §2 "the platform adapter receives a DM ...
//! publishes an `inbound` event into C1 and advances its delivery offset",
//! §5 "inbound platform callback"). The counterpart to
//! [`crate::reconcile::ReconcileHandler::recover`]: recovery catches up on
//! DMs missed while disconnected; this drains the gateway's live stream
//! while the connection is healthy, so a DM never waits for a reconnect to
//! be picked up.

use std::sync::Arc;

use bridge_adapters::gateway_client::GatewayClient;
use bridge_core::dm::{dm_incoming_dedupe_key, offset_scope};
use bridge_core::{DmIncomingPayload, EventInput, EventType, Lane};
use bridge_storage::EventStore;

/// `spec.md` §4.3 "Registers event handlers" — runs for the life of the
/// process, draining [`GatewayClient::next_inbound_dm`] one message at a
/// time.
pub struct LiveIngest<G: GatewayClient> {
    store: Arc<EventStore>,
    client: Arc<G>,
    allowed_user_ids: Vec<String>,
}

impl<G: GatewayClient> LiveIngest<G> {
    pub fn new(store: Arc<EventStore>, client: Arc<G>, allowed_user_ids: Vec<String>) -> Self {
        Self { store, client, allowed_user_ids }
    }

    /// Drains the gateway's inbound-DM stream forever. Returns only once
    /// the client is destroyed and will not reconnect on its own.
    pub async fn run(&self) {
        while let Some(dm) = self.client.next_inbound_dm().await {
            if let Err(e) = self.handle(&dm.message_id, &dm.channel_id, &dm.author_id) {
                tracing::warn!(error = %e, message_id = %dm.message_id, "failed to ingest live dm");
            }
        }
    }

    /// Allowlist filter, then the same publish-and-advance sequence
    /// `reconcile::recover`'s paging does, at interactive lane/priority 15
    /// since this DM is arriving live, not being replayed.
    fn handle(&self, message_id: &str, channel_id: &str, author_id: &str) -> Result<(), bridge_storage::StoreError> {
        if !self.allowed_user_ids.iter().any(|id| id == author_id) {
            return Ok(());
        }

        self.store.publish(
            EventInput::new(
                EventType::DmIncoming(DmIncomingPayload {
                    message_id: message_id.to_string(),
                    channel_id: channel_id.to_string(),
                    author_id: author_id.to_string(),
                }),
                Lane::Interactive,
                15,
            )
            .with_dedupe_key(dm_incoming_dedupe_key(message_id)),
        )?;

        self.store.update_offset(&offset_scope(author_id), message_id)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
