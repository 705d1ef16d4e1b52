// SPDX-License-Identifier: MIT

//! Node executors
//!
//! All node kinds run the same tool-call loop through [`LLMAgent`]. They
//! differ in the system instruction they send and in how they read the
//! loop's outcome. Nodes fail soft: a failing loop becomes an error
//! message in the history instead of an error for the run.

use super::state::{ExecutionState, StateUpdate, ValidationResult};
use crate::adk::agent::LLMAgent;
use crate::adk::model::Content;
use crate::fabriq::tools::{ACCEPTED_SENTINEL, REJECTED_SENTINEL};
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Agent,
    Validator,
    Delegating,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Agent => f.write_str("agent"),
            NodeKind::Validator => f.write_str("validator"),
            NodeKind::Delegating => f.write_str("delegating"),
        }
    }
}

/// One step of a compiled graph
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> NodeKind;

    /// Run the step against the current state. Never fails; failures are
    /// reported inside the returned update.
    async fn execute(&self, state: &ExecutionState) -> StateUpdate;
}

/// Plain agent step
pub struct AgentNode {
    agent: LLMAgent,
}

impl AgentNode {
    pub fn new(agent: LLMAgent) -> Self {
        Self { agent }
    }
}

async fn run_agent(agent: &LLMAgent, state: &ExecutionState) -> StateUpdate {
    match agent.run_turns(state.messages()).await {
        Ok(outcome) => StateUpdate::from_agent(&agent.name, outcome.response),
        Err(e) => {
            log::error!("Agent '{}' error: {}", agent.name, e);
            let text = format!("Error in agent '{}': {}", agent.name, e);
            StateUpdate::from_agent(&agent.name, Content::model(text))
        }
    }
}

#[async_trait]
impl NodeExecutor for AgentNode {
    fn name(&self) -> &str {
        &self.agent.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Agent
    }

    async fn execute(&self, state: &ExecutionState) -> StateUpdate {
        log::info!("Agent '{}' processing", self.agent.name);
        run_agent(&self.agent, state).await
    }
}

/// Extend `prompt` with the hand-off protocol and the list of `peers`
/// (name, description)
pub fn delegation_instruction(prompt: &str, peers: &[(String, String)]) -> String {
    let roster = peers
        .iter()
        .map(|(name, description)| format!("- **{}**: {}", name, description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"{prompt}

## Delegation
You can delegate to other agents if the request is outside your expertise.
To delegate, respond ONLY with JSON:
{{"delegate": "agent_name", "message": "what you need them to do"}}

Available agents:
{roster}

If you can handle the request yourself, respond normally (no JSON).
Only delegate if the task genuinely requires another agent's expertise."#
    )
}

/// Peer step that may hand off to another peer
pub struct DelegatingNode {
    agent: LLMAgent,
}

impl DelegatingNode {
    /// Wrap `agent`, extending its instruction with the delegation protocol
    pub fn new(mut agent: LLMAgent, peers: &[(String, String)]) -> Self {
        agent.instruction = delegation_instruction(&agent.instruction, peers);
        Self { agent }
    }

    pub fn instruction(&self) -> &str {
        &self.agent.instruction
    }
}

#[async_trait]
impl NodeExecutor for DelegatingNode {
    fn name(&self) -> &str {
        &self.agent.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Delegating
    }

    async fn execute(&self, state: &ExecutionState) -> StateUpdate {
        log::info!("Agent '{}' processing (decentralised)", self.agent.name);
        run_agent(&self.agent, state).await
    }
}

/// First verdict found in `tool_results`, in message order
pub fn scan_verdict(tool_results: &[Content]) -> Option<ValidationResult> {
    tool_results.iter().find_map(|msg| {
        let text = msg.text();
        if text.contains(ACCEPTED_SENTINEL) {
            Some(ValidationResult::Accepted)
        } else if text.contains(REJECTED_SENTINEL) {
            Some(ValidationResult::Rejected)
        } else {
            None
        }
    })
}

/// Step that accepts or rejects the pipeline output
pub struct ValidatorNode {
    agent: LLMAgent,
}

impl ValidatorNode {
    pub fn new(agent: LLMAgent) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl NodeExecutor for ValidatorNode {
    fn name(&self) -> &str {
        &self.agent.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Validator
    }

    async fn execute(&self, state: &ExecutionState) -> StateUpdate {
        let name = &self.agent.name;
        log::info!("Validator '{}' processing", name);

        match self.agent.run_turns(state.messages()).await {
            Ok(outcome) => {
                let verdict = scan_verdict(&outcome.tool_results).unwrap_or_else(|| {
                    log::warn!(
                        "Validator '{}' called no verdict tool, treating as implicit accept",
                        name
                    );
                    ValidationResult::Accepted
                });
                let retry_count = match verdict {
                    ValidationResult::Rejected => state.retry_count() + 1,
                    ValidationResult::Accepted => state.retry_count(),
                };
                let update = StateUpdate::from_agent(name, outcome.response);
                update.with_validation(verdict, retry_count)
            }
            Err(e) => {
                log::error!("Validator '{}' error: {}", name, e);
                let text = format!("Error in validator '{}': {}", name, e);
                StateUpdate::from_agent(name, Content::model(text))
                    .with_validation(ValidationResult::Rejected, state.retry_count() + 1)
            }
        }
    }
}
