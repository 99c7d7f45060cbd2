// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The queued unit of work (`spec.md` §3 "Event").

use crate::id::EventId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse priority bucket. Dominates the numeric `priority` field; lower
/// rank is claimed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lane {
    Interactive,
    Recovery,
    Scheduled,
    System,
}

impl Lane {
    /// Ordering rank used in `ORDER BY lane_rank ASC`.
    pub fn rank(self) -> i32 {
        match self {
            Lane::Interactive => 0,
            Lane::Recovery => 1,
            Lane::Scheduled => 2,
            Lane::System => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Interactive => "interactive",
            Lane::Recovery => "recovery",
            Lane::Scheduled => "scheduled",
            Lane::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "interactive" => Some(Lane::Interactive),
            "recovery" => Some(Lane::Recovery),
            "scheduled" => Some(Lane::Scheduled),
            "system" => Some(Lane::System),
            _ => None,
        }
    }
}

/// Lifecycle status of an event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Pending,
    Processing,
    Retry,
    Done,
    Dead,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Retry => "retry",
            EventStatus::Done => "done",
            EventStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EventStatus::Pending),
            "processing" => Some(EventStatus::Processing),
            "retry" => Some(EventStatus::Retry),
            "done" => Some(EventStatus::Done),
            "dead" => Some(EventStatus::Dead),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Done | EventStatus::Dead)
    }
}

/// Payload for `dm.incoming`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmIncomingPayload {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
}

/// Where an outbound send originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundSource {
    DmReply,
    Scheduler,
    ManualSend,
    AuthError,
}

impl OutboundSource {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboundSource::DmReply => "dm_reply",
            OutboundSource::Scheduler => "scheduler",
            OutboundSource::ManualSend => "manual_send",
            OutboundSource::AuthError => "auth_error",
        }
    }
}

/// A file to attach to an outbound send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundFile {
    pub path: String,
    pub name: String,
}

/// Payload for `outbound.dm.request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundDmRequestPayload {
    pub request_id: String,
    pub source: OutboundSource,
    pub text: String,
    pub user_id: Option<String>,
    pub channel_id: Option<String>,
    #[serde(default)]
    pub files: Vec<OutboundFile>,
    pub context: Option<String>,
}

/// Payload for `scheduler.triggered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerTriggeredPayload {
    pub schedule_name: String,
    pub triggered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Payload for `dm.recover.run`. No fields: recovery walks all allowed users.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmRecoverRunPayload {}

/// Payload for `dm.reconcile.run`. No fields: reconcile re-scans DM state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmReconcileRunPayload {}

/// Tagged event type with its typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventType {
    #[serde(rename = "dm.incoming")]
    DmIncoming(DmIncomingPayload),
    #[serde(rename = "outbound.dm.request")]
    OutboundDmRequest(OutboundDmRequestPayload),
    #[serde(rename = "scheduler.triggered")]
    SchedulerTriggered(SchedulerTriggeredPayload),
    #[serde(rename = "dm.recover.run")]
    DmRecoverRun(DmRecoverRunPayload),
    #[serde(rename = "dm.reconcile.run")]
    DmReconcileRun(DmReconcileRunPayload),
}

impl EventType {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventType::DmIncoming(_) => "dm.incoming",
            EventType::OutboundDmRequest(_) => "outbound.dm.request",
            EventType::SchedulerTriggered(_) => "scheduler.triggered",
            EventType::DmRecoverRun(_) => "dm.recover.run",
            EventType::DmReconcileRun(_) => "dm.reconcile.run",
        }
    }
}

/// Input to `EventStore::publish`.
#[derive(Debug, Clone)]
pub struct EventInput {
    pub event_type: EventType,
    pub lane: Lane,
    pub priority: i32,
    pub dedupe_key: Option<String>,
    pub available_at: Option<DateTime<Utc>>,
}

impl EventInput {
    pub fn new(event_type: EventType, lane: Lane, priority: i32) -> Self {
        Self {
            event_type,
            lane,
            priority,
            dedupe_key: None,
            available_at: None,
        }
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn with_available_at(mut self, at: DateTime<Utc>) -> Self {
        self.available_at = Some(at);
        self
    }
}

/// A fully materialized event row.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub lane: Lane,
    pub priority: i32,
    pub dedupe_key: Option<String>,
    pub attempt_count: u32,
    pub status: EventStatus,
    pub available_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
