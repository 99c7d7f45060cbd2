// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Real `PlatformAdapter` backed by `serenity`'s REST client. This is the
//! narrow surface `spec.md` §6 names as an external collaborator — no
//! gateway event handling lives here, only the HTTP calls the worker and
//! DM handler issue.

use super::{PlatformAdapter, PlatformAttachment, PlatformError, PlatformMessage};
use async_trait::async_trait;
use bridge_core::OutboundFile;
use serenity::all::{ChannelId, CreateAttachment, CreateMessage, MessageId, UserId};
use serenity::http::{Http, MessagePagination};
use std::sync::Arc;

pub struct SerenityPlatformAdapter {
    http: Arc<Http>,
}

impl SerenityPlatformAdapter {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    fn map_err(err: serenity::Error) -> PlatformError {
        if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(resp)) = &err {
            return PlatformError::Api {
                code: resp.error.code as u64,
                message: resp.error.message.clone(),
            };
        }
        PlatformError::Transport(err.to_string())
    }

    async fn build_attachments(files: &[OutboundFile]) -> Result<Vec<CreateAttachment>, PlatformError> {
        let mut out = Vec::with_capacity(files.len());
        for file in files {
            let mut attachment = CreateAttachment::path(&file.path)
                .await
                .map_err(Self::map_err)?;
            attachment.filename = file.name.clone();
            out.push(attachment);
        }
        Ok(out)
    }
}

#[async_trait]
impl PlatformAdapter for SerenityPlatformAdapter {
    async fn fetch_dm_channel(&self, channel_id: &str) -> Result<(), PlatformError> {
        let id: u64 = channel_id
            .parse()
            .map_err(|_| PlatformError::Api { code: 10003, message: "malformed channel id".into() })?;
        let channel = self
            .http
            .get_channel(ChannelId::new(id))
            .await
            .map_err(Self::map_err)?;
        if channel.private().is_none() {
            return Err(PlatformError::Api {
                code: 10003,
                message: "channel is not DM-capable".into(),
            });
        }
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<PlatformMessage, PlatformError> {
        let cid: u64 = channel_id.parse().unwrap_or_default();
        let mid: u64 = message_id.parse().unwrap_or_default();
        let message = self
            .http
            .get_message(ChannelId::new(cid), MessageId::new(mid))
            .await
            .map_err(Self::map_err)?;
        Ok(PlatformMessage {
            id: message.id.to_string(),
            channel_id: message.channel_id.to_string(),
            author_id: message.author.id.to_string(),
            is_bot: message.author.bot,
            content: message.content.to_string(),
            attachments: message
                .attachments
                .iter()
                .map(|a| PlatformAttachment {
                    url: a.url.clone(),
                    filename: a.filename.clone(),
                })
                .collect(),
        })
    }

    async fn fetch_messages_after(
        &self,
        channel_id: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<PlatformMessage>, PlatformError> {
        let cid: u64 = channel_id.parse().unwrap_or_default();
        let after_id: u64 = after.parse().unwrap_or(0);
        let messages = self
            .http
            .get_messages(
                ChannelId::new(cid),
                Some(MessagePagination::After(MessageId::new(after_id))),
                Some(limit.min(100) as u8),
            )
            .await
            .map_err(Self::map_err)?;
        let mut out: Vec<PlatformMessage> = messages
            .into_iter()
            .map(|message| PlatformMessage {
                id: message.id.to_string(),
                channel_id: message.channel_id.to_string(),
                author_id: message.author.id.to_string(),
                is_bot: message.author.bot,
                content: message.content.to_string(),
                attachments: message
                    .attachments
                    .iter()
                    .map(|a| PlatformAttachment {
                        url: a.url.clone(),
                        filename: a.filename.clone(),
                    })
                    .collect(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn most_recent_dm_message_id(&self, user_id: &str) -> Result<Option<String>, PlatformError> {
        let uid: u64 = user_id.parse().unwrap_or_default();
        let channel = self
            .http
            .get_user(UserId::new(uid))
            .await
            .map_err(Self::map_err)?
            .create_dm_channel(&self.http)
            .await
            .map_err(Self::map_err)?;
        let messages = self
            .http
            .get_messages(channel.id, None, Some(1))
            .await
            .map_err(Self::map_err)?;
        Ok(messages.first().map(|m| m.id.to_string()))
    }

    async fn dm_channel_for_user(&self, user_id: &str) -> Result<String, PlatformError> {
        let uid: u64 = user_id
            .parse()
            .map_err(|_| PlatformError::Api { code: 10003, message: "malformed user id".into() })?;
        let channel = self
            .http
            .get_user(UserId::new(uid))
            .await
            .map_err(Self::map_err)?
            .create_dm_channel(&self.http)
            .await
            .map_err(Self::map_err)?;
        Ok(channel.id.to_string())
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        let cid: u64 = channel_id.parse().unwrap_or_default();
        let mid: u64 = message_id.parse().unwrap_or_default();
        self.http
            .create_reaction(
                ChannelId::new(cid),
                MessageId::new(mid),
                &serenity::model::channel::ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(Self::map_err)
    }

    async fn send_dm_to_user(
        &self,
        user_id: &str,
        text: Option<&str>,
        files: &[OutboundFile],
    ) -> Result<(), PlatformError> {
        let uid: u64 = user_id.parse().unwrap_or_default();
        let channel = self
            .http
            .get_user(UserId::new(uid))
            .await
            .map_err(Self::map_err)?
            .create_dm_channel(&self.http)
            .await
            .map_err(Self::map_err)?;
        self.send_to_channel(&channel.id.to_string(), text, files).await
    }

    async fn send_to_channel(
        &self,
        channel_id: &str,
        text: Option<&str>,
        files: &[OutboundFile],
    ) -> Result<(), PlatformError> {
        let cid: u64 = channel_id.parse().unwrap_or_default();
        let mut builder = CreateMessage::new();
        if let Some(text) = text {
            builder = builder.content(text);
        }
        let attachments = Self::build_attachments(files).await?;
        for attachment in attachments {
            builder = builder.add_file(attachment);
        }
        self.http
            .send_message(ChannelId::new(cid), vec![], &builder)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn start_typing(&self, channel_id: &str) -> Result<(), PlatformError> {
        let cid: u64 = channel_id.parse().unwrap_or_default();
        self.http
            .broadcast_typing(ChannelId::new(cid))
            .await
            .map_err(Self::map_err)
    }
}
