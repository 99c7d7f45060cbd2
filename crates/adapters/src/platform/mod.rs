// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The chat-platform collaborator (`spec.md` §6 "Chat platform contract"):
//! DM-capable channel fetch, paged message fetch, reaction add, DM send,
//! and a typing indicator.

mod serenity_adapter;

pub use serenity_adapter::SerenityPlatformAdapter;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakePlatformAdapter, PlatformCall};

use async_trait::async_trait;
use bridge_core::OutboundFile;
use thiserror::Error;

/// Terminal chat-platform error codes (`spec.md` §4.4 / §6): unknown
/// channel, unknown message, missing access, missing permissions.
pub const TERMINAL_ERROR_CODES: [u64; 4] = [10003, 10008, 50001, 50013];

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform error {code}: {message}")]
    Api { code: u64, message: String },
    #[error("{0}")]
    Transport(String),
}

impl PlatformError {
    pub fn code(&self) -> Option<u64> {
        match self {
            PlatformError::Api { code, .. } => Some(*code),
            PlatformError::Transport(_) => None,
        }
    }

    /// Whether the worker's error-policy terminal set applies
    /// (`spec.md` §4.4).
    pub fn is_terminal(&self) -> bool {
        self.code()
            .is_some_and(|code| TERMINAL_ERROR_CODES.contains(&code))
    }
}

#[derive(Debug, Clone)]
pub struct PlatformAttachment {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct PlatformMessage {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub is_bot: bool,
    pub content: String,
    pub attachments: Vec<PlatformAttachment>,
}

impl PlatformMessage {
    /// `spec.md` §4.8 recovery filter: "has text or attachments".
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty() || !self.attachments.is_empty()
    }
}

/// The chat-platform collaborator. One call per logical operation; no
/// batching beyond what `fetch_messages_after` already paginates.
#[async_trait]
pub trait PlatformAdapter: Send + Sync + 'static {
    /// Confirms the channel exists and is DM-capable.
    async fn fetch_dm_channel(&self, channel_id: &str) -> Result<(), PlatformError>;

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<PlatformMessage, PlatformError>;

    /// Pages forward from `after` (exclusive), newest id last.
    async fn fetch_messages_after(
        &self,
        channel_id: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<PlatformMessage>, PlatformError>;

    /// The most recent message id in a user's DM channel, if any
    /// (`spec.md` §4.8: "if the delivery offset is empty, initializes it to
    /// the user's most recent DM").
    async fn most_recent_dm_message_id(&self, user_id: &str) -> Result<Option<String>, PlatformError>;

    /// Resolves (creating if necessary) the DM channel id for a user, so
    /// recovery can page through it with `fetch_messages_after`.
    async fn dm_channel_for_user(&self, user_id: &str) -> Result<String, PlatformError>;

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    /// `user.fetch -> user.send` (`spec.md` §4.6).
    async fn send_dm_to_user(
        &self,
        user_id: &str,
        text: Option<&str>,
        files: &[OutboundFile],
    ) -> Result<(), PlatformError>;

    /// `channels.fetch -> channel.send` (`spec.md` §4.6).
    async fn send_to_channel(
        &self,
        channel_id: &str,
        text: Option<&str>,
        files: &[OutboundFile],
    ) -> Result<(), PlatformError>;

    async fn start_typing(&self, channel_id: &str) -> Result<(), PlatformError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
