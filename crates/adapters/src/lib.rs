// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for external I/O: the chat platform, the agent CLI sandbox,
//! and session-file persistence.

pub mod agent;
pub mod gateway_client;
pub mod platform;
pub mod session_files;
pub mod subprocess;

pub use agent::{AgentError, AgentGateway, ClaudeAgentGateway, SendOptions, SendResult};
pub use gateway_client::{GatewayClient, GatewayEvent, SerenityGatewayClient};
pub use platform::{PlatformAdapter, PlatformError, SerenityPlatformAdapter};
pub use session_files::{sanitize_schedule_name, SessionStore, SessionTarget};

#[cfg(any(test, feature = "test-support"))]
pub use agent::{AgentCall, FakeAgentGateway};
#[cfg(any(test, feature = "test-support"))]
pub use gateway_client::FakeGatewayClient;
#[cfg(any(test, feature = "test-support"))]
pub use platform::{FakePlatformAdapter, PlatformCall};
