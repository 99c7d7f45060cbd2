// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! The event-pipeline engine: the worker loop, the connection supervisor,
//! and the per-event-type handlers, wired together by [`runtime::Runtime`].

pub mod dm_handler;
pub mod ingest;
pub mod outbound;
pub mod reconcile;
pub mod runtime;
pub mod scheduler;
pub mod supervisor;
pub mod worker;

pub use dm_handler::DmHandler;
pub use ingest::LiveIngest;
pub use outbound::OutboundSender;
pub use reconcile::{ReconcileHandler, ReconcileScheduler};
pub use runtime::{Paths, Runtime};
pub use scheduler::{ScheduleOutcome, SchedulerHandler, SchedulerRegistrar};
pub use supervisor::{ConnectionSupervisor, SupervisorState};
pub use worker::{EventDispatcher, EventWorker, HandlerError, HandlerResult};
