// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The scheduler (`spec.md` §4.7): registers a cron job per configured
//! schedule and, on firing, invokes the agent CLI and conditionally
//! publishes an outbound reply.
//!
//! Split in two: [`SchedulerRegistrar`] owns the cron timers and only ever
//! publishes `scheduler.triggered`; [`SchedulerHandler`] is what the worker
//! dispatches that event to, and is also reusable directly by the `schedule
//! <name>` CLI command for a one-off run outside the queue.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bridge_adapters::agent::prompt;
use bridge_adapters::agent::{AgentConfig, AgentError, AgentGateway, AgentSource, SendOptions};
use bridge_adapters::session_files::SessionTarget;
use bridge_core::text::{is_skip_response, strip_think_tags};
use bridge_core::{
    EventInput, EventType, Lane, OutboundDmRequestPayload, OutboundSource, ScheduleConfig,
    SchedulerTriggeredPayload, Settings,
};
use bridge_storage::EventStore;
use chrono::{DateTime, Local, Utc};
use cron::Schedule;

use crate::dm_handler::AUTH_RECOVERY_MESSAGE;
use crate::worker::{HandlerError, HandlerResult};

const OUTBOUND_TEXT_LIMIT: usize = 1900;

/// Registers one cron timer per schedule and publishes `scheduler.triggered`
/// on each firing. Owns no agent/session state — that lives in
/// [`SchedulerHandler`], which the worker dispatches the fired event to.
pub struct SchedulerRegistrar {
    store: Arc<EventStore>,
    schedules: Vec<ScheduleConfig>,
}

impl SchedulerRegistrar {
    pub fn new(store: Arc<EventStore>, schedules: Vec<ScheduleConfig>) -> Self {
        Self { store, schedules }
    }

    /// Spawns one background task per schedule. Returns the handles so the
    /// caller can abort them on shutdown.
    pub fn spawn_all(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.schedules
            .iter()
            .cloned()
            .map(|schedule| spawn_schedule(self.store.clone(), schedule))
            .collect()
    }
}

fn spawn_schedule(store: Arc<EventStore>, schedule: ScheduleConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let cron_schedule = match Schedule::from_str(&schedule.cron) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(schedule = %schedule.name, error = %e, "invalid cron expression, schedule disabled");
                return;
            }
        };
        let tz: chrono_tz::Tz = match schedule.timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::error!(schedule = %schedule.name, timezone = %schedule.timezone, "invalid timezone, schedule disabled");
                return;
            }
        };

        loop {
            let now_in_tz = Utc::now().with_timezone(&tz);
            let next = match cron_schedule.after(&now_in_tz).next() {
                Some(next) => next,
                None => {
                    tracing::error!(schedule = %schedule.name, "cron expression has no future firings, schedule disabled");
                    return;
                }
            };
            let delay = (next.with_timezone(&Utc) - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::time::sleep(delay).await;

            let triggered_at = Utc::now();
            let expires_at = triggered_at + chrono::Duration::minutes(15);
            let input = EventInput::new(
                EventType::SchedulerTriggered(SchedulerTriggeredPayload {
                    schedule_name: schedule.name.clone(),
                    triggered_at,
                    expires_at,
                }),
                Lane::Scheduled,
                0,
            );
            if let Err(e) = store.publish(input) {
                tracing::error!(schedule = %schedule.name, error = %e, "failed to publish scheduler.triggered");
            }
        }
    })
}

/// Outcome of one agent-CLI invocation for a schedule.
pub struct ScheduleOutcome {
    pub response: String,
    pub skipped: bool,
}

/// `spec.md` §4.7 — dispatches `scheduler.triggered`.
pub struct SchedulerHandler<A: AgentGateway> {
    store: Arc<EventStore>,
    agent: Arc<A>,
    agent_config: AgentConfig,
    settings_path: PathBuf,
    prompt_template_path: PathBuf,
    /// `spec.md` §1 OVERVIEW: schedule results go "to the same chat
    /// channel" as interactive DMs — the daemon's single notify target,
    /// the first configured allowed user (`spec.md` §6 `ALLOWED_USER_IDS`).
    notify_user_id: Option<String>,
}

impl<A: AgentGateway> SchedulerHandler<A> {
    pub fn new(
        store: Arc<EventStore>,
        agent: Arc<A>,
        agent_config: AgentConfig,
        settings_path: PathBuf,
        prompt_template_path: PathBuf,
        notify_user_id: Option<String>,
    ) -> Self {
        Self {
            store,
            agent,
            agent_config,
            settings_path,
            prompt_template_path,
            notify_user_id,
        }
    }

    pub async fn handle(&self, payload: &SchedulerTriggeredPayload) -> HandlerResult {
        if Utc::now() > payload.expires_at {
            return Err(HandlerError::Terminal(format!(
                "schedule '{}' firing at {} expired",
                payload.schedule_name, payload.triggered_at
            )));
        }

        let settings = Settings::load(&self.settings_path)
            .map_err(|e| HandlerError::Terminal(format!("reload settings: {e}")))?;
        let schedule = settings
            .schedules
            .iter()
            .find(|s| s.name == payload.schedule_name)
            .ok_or_else(|| HandlerError::Terminal(format!("unknown schedule '{}'", payload.schedule_name)))?;

        match self.run_schedule(schedule, payload.triggered_at).await {
            Ok(outcome) => {
                if !outcome.skipped && schedule.discord_notify {
                    self.publish_outbound(schedule, payload, outcome.response);
                }
                Ok(())
            }
            Err(err) if err.is_auth_error() => {
                // `spec.md` §5 "User-visible failures": the only
                // scheduler-originated error path allowed to surface.
                if schedule.discord_notify {
                    self.publish_outbound(schedule, payload, AUTH_RECOVERY_MESSAGE.to_string());
                }
                Err(HandlerError::Terminal(err.to_string()))
            }
            Err(err) => Err(HandlerError::Terminal(err.to_string())),
        }
    }

    /// Runs one schedule's agent-CLI call. Public so the `schedule <name>`
    /// CLI command can invoke it directly, outside the event queue.
    pub async fn run_schedule(
        &self,
        schedule: &ScheduleConfig,
        triggered_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, AgentError> {
        let user_input = self.build_user_input(schedule);
        let session_target = match schedule.session_mode {
            bridge_core::SessionMode::Main => SessionTarget::Main,
            bridge_core::SessionMode::Isolated => SessionTarget::Isolated(schedule.name.clone()),
        };

        let template = std::fs::read_to_string(&self.prompt_template_path)
            .map_err(|e| AgentError::InvocationFailed(format!("prompt template: {e}")))?;
        let prompt_text = prompt::assemble(&template, Local::now(), AgentSource::Scheduler, None, &user_input);

        let options = SendOptions {
            bypass_mode: false,
            attachments: Vec::new(),
            source: AgentSource::Scheduler,
            author_id: None,
            session_target,
        };

        let result = self.agent.send_to_agent(&prompt_text, &self.agent_config, options).await?;
        let cleaned = strip_think_tags(&result.response);
        self.write_handoff(schedule, triggered_at, &cleaned);
        let skipped = schedule.skippable && is_skip_response(&cleaned);
        Ok(ScheduleOutcome { response: cleaned, skipped })
    }

    fn build_user_input(&self, schedule: &ScheduleConfig) -> String {
        match &schedule.prompt_file {
            Some(path) => std::fs::read_to_string(path).unwrap_or_else(|e| {
                tracing::warn!(schedule = %schedule.name, path = %path, error = %e, "prompt_file unreadable, falling back to inline prompt");
                schedule.prompt.clone()
            }),
            None => schedule.prompt.clone(),
        }
    }

    /// Best-effort append to `handoffs/YYYY/MM/DD/<schedule>.md`
    /// (`spec.md` §6 persisted state). Never fails the schedule.
    fn write_handoff(&self, schedule: &ScheduleConfig, triggered_at: DateTime<Utc>, text: &str) {
        let path = handoff_path(&self.agent_config.project_root, schedule, triggered_at);
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(schedule = %schedule.name, error = %e, "failed to create handoffs directory");
                return;
            }
        }
        use std::io::Write;
        let entry = format!("## {}\n\n{}\n\n", triggered_at.to_rfc3339(), text);
        match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut f) => {
                if let Err(e) = f.write_all(entry.as_bytes()) {
                    tracing::warn!(schedule = %schedule.name, error = %e, "failed to write handoff");
                }
            }
            Err(e) => tracing::warn!(schedule = %schedule.name, error = %e, "failed to open handoff file"),
        }
    }

    fn publish_outbound(&self, schedule: &ScheduleConfig, payload: &SchedulerTriggeredPayload, text: String) {
        let truncated: String = if text.chars().count() > OUTBOUND_TEXT_LIMIT {
            text.chars().take(OUTBOUND_TEXT_LIMIT).collect()
        } else {
            text
        };
        let dedupe_key = format!("outbound:schedule:{}:{}", schedule.name, payload.triggered_at.to_rfc3339());
        let publish = self.store.publish(
            EventInput::new(
                EventType::OutboundDmRequest(OutboundDmRequestPayload {
                    request_id: format!("schedule:{}", schedule.name),
                    source: OutboundSource::Scheduler,
                    text: truncated,
                    user_id: self.notify_user_id.clone(),
                    channel_id: None,
                    files: Vec::new(),
                    context: Some(format!("schedule={}", schedule.name)),
                }),
                Lane::Scheduled,
                0,
            )
            .with_dedupe_key(dedupe_key),
        );
        if let Err(e) = publish {
            tracing::warn!(schedule = %schedule.name, error = %e, "failed to publish scheduler outbound");
        }
    }
}

fn handoff_path(project_root: &Path, schedule: &ScheduleConfig, triggered_at: DateTime<Utc>) -> PathBuf {
    let sanitized = bridge_adapters::sanitize_schedule_name(&schedule.name);
    project_root
        .join("handoffs")
        .join(triggered_at.format("%Y").to_string())
        .join(triggered_at.format("%m").to_string())
        .join(triggered_at.format("%d").to_string())
        .join(format!("{sanitized}.md"))
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
