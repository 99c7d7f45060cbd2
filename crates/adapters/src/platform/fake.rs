// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Deterministic in-memory platform adapter for tests.

use super::{PlatformAdapter, PlatformError, PlatformMessage};
use async_trait::async_trait;
use bridge_core::OutboundFile;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum PlatformCall {
    FetchDmChannel { channel_id: String },
    FetchMessage { channel_id: String, message_id: String },
    FetchMessagesAfter { channel_id: String, after: String },
    AddReaction { channel_id: String, message_id: String, emoji: String },
    SendDmToUser { user_id: String, text: Option<String> },
    SendToChannel { channel_id: String, text: Option<String> },
    StartTyping { channel_id: String },
}

#[derive(Default)]
struct FakeState {
    calls: Vec<PlatformCall>,
    messages: HashMap<(String, String), PlatformMessage>,
    channel_history: HashMap<String, Vec<PlatformMessage>>,
    dm_channels: HashMap<String, String>,
    most_recent_dm: HashMap<String, String>,
    sent_dms: Vec<(String, Option<String>, Vec<OutboundFile>)>,
    sent_channel_messages: Vec<(String, Option<String>, Vec<OutboundFile>)>,
    reactions: Vec<(String, String, String)>,
    next_error: Option<PlatformError>,
    unknown_channels: std::collections::HashSet<String>,
}

/// Records every call and lets tests script responses and errors.
#[derive(Clone, Default)]
pub struct FakePlatformAdapter {
    state: Arc<Mutex<FakeState>>,
}

impl FakePlatformAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    pub fn push_message(&self, message: PlatformMessage) {
        let mut state = self.state.lock();
        state
            .channel_history
            .entry(message.channel_id.clone())
            .or_default()
            .push(message.clone());
        state
            .messages
            .insert((message.channel_id.clone(), message.id.clone()), message);
    }

    pub fn set_most_recent_dm(&self, user_id: &str, message_id: &str) {
        self.state
            .lock()
            .most_recent_dm
            .insert(user_id.to_string(), message_id.to_string());
    }

    /// Scripts the DM channel id `dm_channel_for_user` resolves for a given
    /// user. Defaults to the user id itself if never set.
    pub fn set_dm_channel(&self, user_id: &str, channel_id: &str) {
        self.state
            .lock()
            .dm_channels
            .insert(user_id.to_string(), channel_id.to_string());
    }

    pub fn mark_channel_unknown(&self, channel_id: &str) {
        self.state
            .lock()
            .unknown_channels
            .insert(channel_id.to_string());
    }

    pub fn set_next_error(&self, error: PlatformError) {
        self.state.lock().next_error = Some(error);
    }

    pub fn reactions(&self) -> Vec<(String, String, String)> {
        self.state.lock().reactions.clone()
    }

    pub fn sent_dms(&self) -> Vec<(String, Option<String>, Vec<OutboundFile>)> {
        self.state.lock().sent_dms.clone()
    }

    pub fn sent_channel_messages(&self) -> Vec<(String, Option<String>, Vec<OutboundFile>)> {
        self.state.lock().sent_channel_messages.clone()
    }

    fn take_error(&self) -> Option<PlatformError> {
        self.state.lock().next_error.take()
    }
}

#[async_trait]
impl PlatformAdapter for FakePlatformAdapter {
    async fn fetch_dm_channel(&self, channel_id: &str) -> Result<(), PlatformError> {
        self.state.lock().calls.push(PlatformCall::FetchDmChannel {
            channel_id: channel_id.to_string(),
        });
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        if self.state.lock().unknown_channels.contains(channel_id) {
            return Err(PlatformError::Api {
                code: 10003,
                message: "unknown channel".into(),
            });
        }
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<PlatformMessage, PlatformError> {
        self.state.lock().calls.push(PlatformCall::FetchMessage {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        });
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        self.state
            .lock()
            .messages
            .get(&(channel_id.to_string(), message_id.to_string()))
            .cloned()
            .ok_or(PlatformError::Api {
                code: 10008,
                message: "unknown message".into(),
            })
    }

    async fn fetch_messages_after(
        &self,
        channel_id: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<PlatformMessage>, PlatformError> {
        self.state.lock().calls.push(PlatformCall::FetchMessagesAfter {
            channel_id: channel_id.to_string(),
            after: after.to_string(),
        });
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        let state = self.state.lock();
        let history = state.channel_history.get(channel_id).cloned().unwrap_or_default();
        let after_num: Option<u128> = after.parse().ok();
        let mut page: Vec<PlatformMessage> = history
            .into_iter()
            .filter(|m| match (after_num, m.id.parse::<u128>()) {
                (Some(a), Ok(id)) => id > a,
                _ => m.id.as_str() > after,
            })
            .collect();
        page.sort_by(|a, b| a.id.cmp(&b.id));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn most_recent_dm_message_id(&self, user_id: &str) -> Result<Option<String>, PlatformError> {
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        Ok(self.state.lock().most_recent_dm.get(user_id).cloned())
    }

    async fn dm_channel_for_user(&self, user_id: &str) -> Result<String, PlatformError> {
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        let state = self.state.lock();
        Ok(state.dm_channels.get(user_id).cloned().unwrap_or_else(|| user_id.to_string()))
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.state.lock().calls.push(PlatformCall::AddReaction {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        self.state.lock().reactions.push((
            channel_id.to_string(),
            message_id.to_string(),
            emoji.to_string(),
        ));
        Ok(())
    }

    async fn send_dm_to_user(
        &self,
        user_id: &str,
        text: Option<&str>,
        files: &[OutboundFile],
    ) -> Result<(), PlatformError> {
        self.state.lock().calls.push(PlatformCall::SendDmToUser {
            user_id: user_id.to_string(),
            text: text.map(String::from),
        });
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        self.state.lock().sent_dms.push((
            user_id.to_string(),
            text.map(String::from),
            files.to_vec(),
        ));
        Ok(())
    }

    async fn send_to_channel(
        &self,
        channel_id: &str,
        text: Option<&str>,
        files: &[OutboundFile],
    ) -> Result<(), PlatformError> {
        self.state.lock().calls.push(PlatformCall::SendToChannel {
            channel_id: channel_id.to_string(),
            text: text.map(String::from),
        });
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        self.state.lock().sent_channel_messages.push((
            channel_id.to_string(),
            text.map(String::from),
            files.to_vec(),
        ));
        Ok(())
    }

    async fn start_typing(&self, channel_id: &str) -> Result<(), PlatformError> {
        self.state.lock().calls.push(PlatformCall::StartTyping {
            channel_id: channel_id.to_string(),
        });
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        Ok(())
    }
}
