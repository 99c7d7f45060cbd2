// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the bridge-daemon authors

//! Scriptable `AgentGateway` for engine-level tests, mirroring the
//! teacher's `FakeAgentAdapter` call-recording pattern.

use super::{AgentConfig, AgentError, AgentGateway, AgentSource, SendOptions, SendResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AgentCall {
    pub prompt_text: String,
    pub options: SendOptions,
}

struct FakeState {
    calls: Vec<AgentCall>,
    responses: Vec<Result<SendResult, AgentError>>,
    default_response: Result<SendResult, AgentError>,
}

#[derive(Clone)]
pub struct FakeAgentGateway {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeAgentGateway {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                calls: Vec::new(),
                responses: Vec::new(),
                default_response: Ok(SendResult {
                    response: "ok".to_string(),
                    session_id: "fake-session".to_string(),
                }),
            })),
        }
    }
}

impl FakeAgentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.state.lock().calls.clone()
    }

    /// Queues one response, consumed in FIFO order by successive calls.
    pub fn push_response(&self, response: Result<SendResult, AgentError>) {
        self.state.lock().responses.push(response);
    }

    pub fn set_default_response(&self, response: Result<SendResult, AgentError>) {
        self.state.lock().default_response = response;
    }
}

#[async_trait]
impl AgentGateway for FakeAgentGateway {
    async fn send_to_agent(
        &self,
        prompt_text: &str,
        _config: &AgentConfig,
        options: SendOptions,
    ) -> Result<SendResult, AgentError> {
        let mut state = self.state.lock();
        state.calls.push(AgentCall {
            prompt_text: prompt_text.to_string(),
            options,
        });
        if !state.responses.is_empty() {
            state.responses.remove(0)
        } else {
            state.default_response.clone()
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
