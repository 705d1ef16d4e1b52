// SPDX-License-Identifier: MIT

//! Routing decisions between nodes
//!
//! Each router looks only at the text of the latest message plus static
//! topology metadata. Model output is free text, so decoding is a
//! best-effort attempt against a small closed set of JSON shapes.

use super::state::{ExecutionState, ValidationResult};
use crate::adk::model::extract_content;
use serde::Deserialize;
use serde_json::Value;

/// `agent` value an orchestrator uses to finish the run
pub const DONE_SENTINEL: &str = "__done__";
/// Validator rejections allowed before a sequential run gives up
pub const MAX_RETRIES: u32 = 3;

/// Routing JSON a model may emit
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RoutingPayload {
    /// `{"agent": "writer_1"}` or `{"agent": "__done__", "response": "..."}`
    Orchestration {
        agent: String,
        #[serde(default)]
        response: Option<Value>,
    },
    /// `{"delegate": "coder_0", "message": "..."}`
    Delegation {
        delegate: String,
        #[serde(default)]
        message: Option<Value>,
    },
}

impl RoutingPayload {
    /// Decode `text` as a routing payload; anything else is `None`
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text.trim()).ok()
    }

    /// Final answer embedded in a terminating orchestrator payload
    pub fn done_response(&self) -> Option<String> {
        match self {
            RoutingPayload::Orchestration {
                agent,
                response: Some(response),
            } if agent == DONE_SENTINEL => {
                Some(extract_content(response)).filter(|r| !r.is_empty())
            }
            _ => None,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A router decided the work is finished
    Done,
    /// The validator accepted the output
    Accepted,
    /// The validator kept rejecting until the retry cap
    RetriesExhausted,
}

impl Termination {
    pub fn is_error(self) -> bool {
        matches!(self, Termination::RetriesExhausted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    To(String),
    End(Termination),
}

/// Route plus any answer the router adopted on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub route: Route,
    pub final_response: Option<String>,
}

impl From<Route> for Decision {
    fn from(route: Route) -> Self {
        Self {
            route,
            final_response: None,
        }
    }
}

/// Decide the orchestrator's next hop
pub fn route_orchestrator(text: &str, specialists: &[String]) -> Decision {
    if let Some(payload) = RoutingPayload::parse(text) {
        if let RoutingPayload::Orchestration { agent, .. } = &payload {
            if agent == DONE_SENTINEL {
                return Decision {
                    route: Route::End(Termination::Done),
                    final_response: payload.done_response(),
                };
            }
            if specialists.iter().any(|s| s == agent) {
                return Route::To(agent.clone()).into();
            }
        }
    }

    let lowered = text.to_lowercase();
    if let Some(name) = specialists
        .iter()
        .find(|name| lowered.contains(&name.to_lowercase()))
    {
        log::info!("Fallback routing: found '{}' in orchestrator output", name);
        return Route::To(name.clone()).into();
    }

    log::warn!(
        "Could not parse routing decision, defaulting to {}",
        DONE_SENTINEL
    );
    Route::End(Termination::Done).into()
}

/// Decide whether a peer hands off; anything but a valid hand-off ends the run
pub fn route_delegation(text: &str, peers: &[String]) -> Route {
    if let Some(RoutingPayload::Delegation { delegate, .. }) = RoutingPayload::parse(text) {
        if peers.iter().any(|p| *p == delegate) {
            log::info!("Delegation: -> {}", delegate);
            return Route::To(delegate);
        }
        log::debug!("Ignoring delegation to unknown peer '{}'", delegate);
    }
    Route::End(Termination::Done)
}

/// Validation retry state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPhase {
    /// No verdict yet
    Running,
    /// Rejected with retries left
    RetryPending,
    Accepted,
    /// Rejected at or above the retry cap
    RejectedFinal,
}

impl ValidationPhase {
    pub fn from_state(
        result: Option<ValidationResult>,
        retry_count: u32,
        max_retries: u32,
    ) -> Self {
        match result {
            Some(ValidationResult::Accepted) => ValidationPhase::Accepted,
            _ if retry_count >= max_retries => ValidationPhase::RejectedFinal,
            Some(ValidationResult::Rejected) => ValidationPhase::RetryPending,
            None => ValidationPhase::Running,
        }
    }
}

/// Decide what follows a validator step
pub fn route_validation(
    result: Option<ValidationResult>,
    retry_count: u32,
    max_retries: u32,
    retry_target: &str,
) -> Route {
    match ValidationPhase::from_state(result, retry_count, max_retries) {
        ValidationPhase::Accepted => Route::End(Termination::Accepted),
        ValidationPhase::RejectedFinal => {
            log::warn!("Pipeline rejected {} times, giving up", retry_count);
            Route::End(Termination::RetriesExhausted)
        }
        ValidationPhase::RetryPending => {
            log::info!(
                "Pipeline rejected, retrying (attempt {}/{})",
                retry_count,
                max_retries
            );
            Route::To(retry_target.to_string())
        }
        ValidationPhase::Running => {
            log::warn!("Validator produced no verdict, restarting pipeline");
            Route::To(retry_target.to_string())
        }
    }
}

/// Conditional edge behaviour attached to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Router {
    Orchestrator { specialists: Vec<String> },
    Delegation { peers: Vec<String> },
    Validation {
        retry_target: String,
        max_retries: u32,
    },
}

impl Router {
    pub fn decide(&self, state: &ExecutionState) -> Decision {
        let text = state.last_message().map(|m| m.text()).unwrap_or_default();
        match self {
            Router::Orchestrator { specialists } => route_orchestrator(&text, specialists),
            Router::Delegation { peers } => route_delegation(&text, peers).into(),
            Router::Validation {
                retry_target,
                max_retries,
            } => route_validation(
                state.validation_result(),
                state.retry_count(),
                *max_retries,
                retry_target,
            )
            .into(),
        }
    }

    /// Node names this router can send control to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Router::Orchestrator { specialists } => {
                specialists.iter().map(String::as_str).collect()
            }
            Router::Delegation { peers } => peers.iter().map(String::as_str).collect(),
            Router::Validation { retry_target, .. } => vec![retry_target.as_str()],
        }
    }

    /// Hand-offs decided by a model rather than bounded retries
    pub fn counts_toward_iteration_cap(&self) -> bool {
        !matches!(self, Router::Validation { .. })
    }
}
