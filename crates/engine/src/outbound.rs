// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The outbound sender (`spec.md` §4.6). Handles `outbound.dm.request`:
//! chunks text, attaches files to the first chunk, and routes to either a
//! user DM or a channel depending on which id the payload carries.

use std::sync::Arc;

use bridge_adapters::platform::{PlatformAdapter, PlatformError};
use bridge_core::text::split_message;
use bridge_core::{OutboundDmRequestPayload, OutboundFile, OutboundSource};

use crate::worker::{HandlerError, HandlerResult};

fn classify_send_error(err: PlatformError) -> HandlerError {
    let message = err.to_string();
    // `spec.md` §4.6: "for DM-targeted sends, 'channel not sendable'
    // becomes terminal" — not part of the standard terminal code set.
    if err.is_terminal() || message.to_lowercase().contains("not sendable") {
        HandlerError::Terminal(message)
    } else {
        HandlerError::Retryable(message)
    }
}

pub struct OutboundSender<P: PlatformAdapter> {
    platform: Arc<P>,
    fallback_message: String,
}

impl<P: PlatformAdapter> OutboundSender<P> {
    pub fn new(platform: Arc<P>, fallback_message: impl Into<String>) -> Self {
        Self {
            platform,
            fallback_message: fallback_message.into(),
        }
    }

    pub async fn handle(&self, payload: &OutboundDmRequestPayload) -> HandlerResult {
        let chunks = split_message(&payload.text);

        if chunks.is_empty() {
            // "if there is no text at all, the file-only composite is
            // still sent" — files win over the empty-chunk fallback rule.
            if !payload.files.is_empty() {
                return self.send_chunk(payload, None, &payload.files).await;
            }
            if payload.source == OutboundSource::Scheduler {
                tracing::info!(request_id = %payload.request_id, "outbound produced no sendable text; scheduler source, dropping silently");
                return Ok(());
            }
            if self.fallback_message.is_empty() {
                return Ok(());
            }
            return self.send_chunk(payload, Some(&self.fallback_message), &[]).await;
        }

        for (idx, chunk) in chunks.iter().enumerate() {
            let files: &[OutboundFile] = if idx == 0 { &payload.files } else { &[] };
            self.send_chunk(payload, Some(chunk), files).await?;
        }
        Ok(())
    }

    async fn send_chunk(
        &self,
        payload: &OutboundDmRequestPayload,
        text: Option<&str>,
        files: &[OutboundFile],
    ) -> HandlerResult {
        let result = if let Some(user_id) = &payload.user_id {
            self.platform.send_dm_to_user(user_id, text, files).await
        } else if let Some(channel_id) = &payload.channel_id {
            self.platform.send_to_channel(channel_id, text, files).await
        } else {
            return Err(HandlerError::Terminal(
                "outbound request has neither user_id nor channel_id".to_string(),
            ));
        };
        result.map_err(classify_send_error)
    }
}

#[cfg(test)]
#[path = "outbound_tests.rs"]
mod tests;
