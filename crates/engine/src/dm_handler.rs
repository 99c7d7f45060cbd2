// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The DM lifecycle state machine (`spec.md` §4.5). Each step is gated on a
//! `DmState` flag so replaying a `dm.incoming` event after a crash skips
//! whatever already completed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bridge_adapters::agent::prompt;
use bridge_adapters::agent::{
    AgentConfig, AgentError, AgentGateway, AgentSource, AttachmentDescriptor, SendOptions,
};
use bridge_adapters::platform::{PlatformAdapter, PlatformError, PlatformMessage};
use bridge_adapters::session_files::{SessionStore, SessionTarget};
use bridge_core::{
    DmIncomingPayload, DmState, EventInput, EventType, Lane, OutboundDmRequestPayload,
    OutboundSource,
};
use bridge_storage::EventStore;
use chrono::Local;

use crate::worker::{HandlerError, HandlerResult};

const EYE_EMOJI: &str = "\u{1F440}";
const CHECK_EMOJI: &str = "\u{2705}";
const CROSS_EMOJI: &str = "\u{274C}";
const TYPING_INTERVAL: Duration = Duration::from_secs(9);
const EMPTY_RESPONSE_MAX_ATTEMPTS: u32 = 4;
const OUTBOUND_TEXT_LIMIT: usize = 1900;

pub(crate) const AUTH_RECOVERY_MESSAGE: &str = "I'm not logged in to the agent CLI right now. \
An operator needs to run the login flow on the host before I can reply to messages. \
This will resolve automatically once that's done.";

const PROGRESS_HINT: &str = "(Still working on this — you'll get a reply shortly.)";

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn classify_platform_error(err: PlatformError) -> HandlerError {
    if err.is_terminal() {
        HandlerError::Terminal(err.to_string())
    } else {
        HandlerError::Retryable(err.to_string())
    }
}

/// `spec.md` §4.5 — dispatches `dm.incoming`.
pub struct DmHandler<P: PlatformAdapter, A: AgentGateway> {
    store: Arc<EventStore>,
    platform: Arc<P>,
    agent: Arc<A>,
    sessions: SessionStore,
    agent_config: AgentConfig,
    bypass_mode: bool,
    prompt_template_path: PathBuf,
    attachments_dir: PathBuf,
}

impl<P: PlatformAdapter, A: AgentGateway> DmHandler<P, A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<EventStore>,
        platform: Arc<P>,
        agent: Arc<A>,
        sessions: SessionStore,
        agent_config: AgentConfig,
        bypass_mode: bool,
        prompt_template_path: PathBuf,
        attachments_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            platform,
            agent,
            sessions,
            agent_config,
            bypass_mode,
            prompt_template_path,
            attachments_dir,
        }
    }

    /// `spec.md` §4.5 steps 1-2: upsert, then bail if there's nothing left
    /// to do.
    pub async fn handle(&self, payload: &DmIncomingPayload) -> HandlerResult {
        self.store
            .upsert_dm(&payload.message_id, &payload.channel_id, &payload.author_id)
            .map_err(|e| HandlerError::Retryable(format!("upsert_dm: {e}")))?;

        let state = self
            .store
            .get_dm_state(&payload.message_id)
            .map_err(|e| HandlerError::Retryable(format!("get_dm_state: {e}")))?;
        let state = match state {
            Some(s) if !s.terminal_failed => s,
            _ => return Ok(()),
        };

        let typing = self.spawn_typing(payload.channel_id.clone());
        let result = self.process(payload, &state).await;
        typing.abort();

        if let Err(HandlerError::Terminal(message)) = &result {
            self.settle_terminal(payload, message).await;
        }
        result
    }

    async fn process(&self, payload: &DmIncomingPayload, state: &DmState) -> HandlerResult {
        let message = self.fetch_message(payload).await?;

        if !state.eye_applied {
            self.platform
                .add_reaction(&payload.channel_id, &payload.message_id, EYE_EMOJI)
                .await
                .map_err(classify_platform_error)?;
            self.store
                .mark_eye_applied(&payload.message_id)
                .map_err(|e| HandlerError::Retryable(format!("mark_eye_applied: {e}")))?;
        }

        if !state.processing_done {
            self.run_agent_step(payload, &message).await?;
            self.store
                .mark_processing_done(&payload.message_id)
                .map_err(|e| HandlerError::Retryable(format!("mark_processing_done: {e}")))?;
        }

        if !state.check_applied {
            self.platform
                .add_reaction(&payload.channel_id, &payload.message_id, CHECK_EMOJI)
                .await
                .map_err(classify_platform_error)?;
            self.store
                .mark_check_applied(&payload.message_id)
                .map_err(|e| HandlerError::Retryable(format!("mark_check_applied: {e}")))?;
        }

        Ok(())
    }

    /// `spec.md` §4.5 step 3: channel fetch + message fetch.
    async fn fetch_message(&self, payload: &DmIncomingPayload) -> Result<PlatformMessage, HandlerError> {
        self.platform
            .fetch_dm_channel(&payload.channel_id)
            .await
            .map_err(classify_platform_error)?;
        self.platform
            .fetch_message(&payload.channel_id, &payload.message_id)
            .await
            .map_err(classify_platform_error)
    }

    /// `spec.md` §4.5 step 5: command interception, attachment presence
    /// check, the empty-response retry wrapper, and the three error
    /// classifications.
    async fn run_agent_step(&self, payload: &DmIncomingPayload, message: &PlatformMessage) -> HandlerResult {
        let trimmed = message.content.trim();

        if trimmed == "!reset" {
            self.sessions
                .clear(&SessionTarget::Main)
                .map_err(|e| HandlerError::Retryable(e.to_string()))?;
            return self
                .send_direct(&payload.channel_id, "Session cleared. Starting fresh conversation.")
                .await;
        }
        if trimmed == "!session" {
            let current = self
                .sessions
                .read(&SessionTarget::Main)
                .map_err(|e| HandlerError::Retryable(e.to_string()))?;
            let reply = match current {
                Some(id) => format!("Current session: {id}"),
                None => "No active session.".to_string(),
            };
            return self.send_direct(&payload.channel_id, &reply).await;
        }

        let attachments = self.build_attachments(payload, message);
        if let Some(missing) = attachments.iter().find(|a| !a.path.exists()) {
            return self
                .fail_with_outbound(
                    payload,
                    format!("I couldn't find the attachment \"{}\" on disk.", missing.name),
                )
                .await;
        }

        let attachment_names: Vec<String> = attachments.iter().map(|a| a.name.clone()).collect();
        let prompt_text = self.build_prompt(payload, message, &attachment_names)?;
        let options = SendOptions {
            bypass_mode: self.bypass_mode,
            attachments,
            source: AgentSource::Dm,
            author_id: Some(payload.author_id.clone()),
            session_target: SessionTarget::Main,
        };

        match self.empty_response_retry(&prompt_text, options).await {
            Ok(result) => {
                self.publish_outbound(
                    payload,
                    OutboundSource::DmReply,
                    result.response,
                    format!("outbound:{}:reply", payload.message_id),
                );
                Ok(())
            }
            Err(err) if err.is_auth_error() => {
                self.fail_with_outbound(payload, AUTH_RECOVERY_MESSAGE.to_string()).await
            }
            Err(err) => Err(HandlerError::Terminal(err.to_string())),
        }
    }

    /// `spec.md` §4.5: "call up to 1 + 3 times; return the first call whose
    /// response has non-empty trimmed text ... after the final attempt
    /// returns the last result regardless". Whitespace-only counts as empty
    /// (`spec.md` §9 open question 3, preserved deliberately).
    async fn empty_response_retry(
        &self,
        prompt_text: &str,
        options: SendOptions,
    ) -> Result<bridge_adapters::agent::SendResult, AgentError> {
        let mut result = self.agent.send_to_agent(prompt_text, &self.agent_config, options.clone()).await?;
        for _ in 1..EMPTY_RESPONSE_MAX_ATTEMPTS {
            if !result.response.trim().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            result = self.agent.send_to_agent(prompt_text, &self.agent_config, options.clone()).await?;
        }
        Ok(result)
    }

    fn build_attachments(&self, payload: &DmIncomingPayload, message: &PlatformMessage) -> Vec<AttachmentDescriptor> {
        message
            .attachments
            .iter()
            .map(|a| AttachmentDescriptor {
                path: self.attachments_dir.join(&payload.message_id).join(&a.filename),
                name: a.filename.clone(),
            })
            .collect()
    }

    fn build_prompt(
        &self,
        payload: &DmIncomingPayload,
        message: &PlatformMessage,
        attachment_names: &[String],
    ) -> Result<String, HandlerError> {
        let template = std::fs::read_to_string(&self.prompt_template_path)
            .map_err(|e| HandlerError::Retryable(format!("prompt template: {e}")))?;
        let assistant_context = prompt::build_assistant_context(
            AgentSource::Dm,
            Some(&payload.author_id),
            Some(PROGRESS_HINT),
            attachment_names,
        );
        let user_input = prompt::build_user_input(&message.content);
        Ok(prompt::assemble(
            &template,
            Local::now(),
            AgentSource::Dm,
            assistant_context.as_deref(),
            &user_input,
        ))
    }

    async fn send_direct(&self, channel_id: &str, text: &str) -> HandlerResult {
        self.platform
            .send_to_channel(channel_id, Some(text), &[])
            .await
            .map_err(classify_platform_error)
    }

    fn publish_outbound(&self, payload: &DmIncomingPayload, source: OutboundSource, text: String, dedupe_key: String) {
        let publish = self.store.publish(
            EventInput::new(
                EventType::OutboundDmRequest(OutboundDmRequestPayload {
                    request_id: payload.message_id.clone(),
                    source,
                    text: truncate_chars(&text, OUTBOUND_TEXT_LIMIT),
                    user_id: None,
                    channel_id: Some(payload.channel_id.clone()),
                    files: Vec::new(),
                    context: None,
                }),
                Lane::Interactive,
                15,
            )
            .with_dedupe_key(dedupe_key),
        );
        if let Err(e) = publish {
            tracing::warn!(error = %e, message_id = %payload.message_id, "failed to publish DM outbound");
        }
    }

    /// Auth-error and attachment-error branches of step 5: publish a
    /// user-facing error outbound, then raise terminal (settling happens in
    /// `handle`).
    async fn fail_with_outbound(&self, payload: &DmIncomingPayload, text: String) -> HandlerResult {
        self.publish_outbound(
            payload,
            OutboundSource::AuthError,
            text.clone(),
            format!("outbound:{}:error", payload.message_id),
        );
        Err(HandlerError::Terminal(text))
    }

    /// Common terminal settling shared by every step-3/4/5 terminal path
    /// (`spec.md` §7: "dead-letter the event, settle DM-state side effects
    /// (❌ reaction + `mark_dm_terminal_failure`)").
    async fn settle_terminal(&self, payload: &DmIncomingPayload, error: &str) {
        if let Err(e) = self
            .platform
            .add_reaction(&payload.channel_id, &payload.message_id, CROSS_EMOJI)
            .await
        {
            tracing::warn!(error = %e, message_id = %payload.message_id, "failed to apply error reaction");
        }
        if let Err(e) = self.store.mark_dm_terminal_failure(&payload.message_id, error) {
            tracing::warn!(error = %e, message_id = %payload.message_id, "failed to mark dm terminal failure");
        }
    }

    /// `spec.md` §4.5 "Typing indicator": ping every 9s, first one
    /// immediate, stopped by aborting this task on completion or error.
    fn spawn_typing(&self, channel_id: String) -> tokio::task::JoinHandle<()> {
        let platform = self.platform.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = platform.start_typing(&channel_id).await {
                    tracing::debug!(error = %e, channel_id, "start_typing failed");
                }
                tokio::time::sleep(TYPING_INTERVAL).await;
            }
        })
    }
}

#[cfg(test)]
#[path = "dm_handler_tests.rs"]
mod tests;
