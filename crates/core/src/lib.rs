// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bridge-core: shared domain types for the agent bridge daemon.

pub mod backoff;
pub mod clock;
pub mod config;
pub mod dm;
pub mod event;
pub mod id;
pub mod text;

pub use backoff::{backoff_ms, MAX_ATTEMPTS, STALE_LOCK_TIMEOUT_MS};
pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, Env, ScheduleConfig, SessionMode, Settings};
pub use dm::DmState;
pub use event::{
    DmIncomingPayload, DmRecoverRunPayload, DmReconcileRunPayload, Event, EventInput, EventStatus,
    EventType, Lane, OutboundDmRequestPayload, OutboundFile, OutboundSource,
    SchedulerTriggeredPayload,
};
pub use id::EventId;

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
