// SPDX-License-Identifier: MIT

//! Per-run execution state and node updates
//!
//! Nodes never mutate [`ExecutionState`] directly. They return a
//! [`StateUpdate`] that the executor merges with fixed reducers:
//! messages append, scalar fields overwrite when present, and the retry
//! count only moves upward.

use crate::adk::model::Content;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the latest validator check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationResult {
    Accepted,
    Rejected,
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationResult::Accepted => f.write_str("accepted"),
            ValidationResult::Rejected => f.write_str("rejected"),
        }
    }
}

/// State threaded through every node of one run
#[derive(Debug, Clone)]
pub struct ExecutionState {
    messages: Vec<Content>,
    current_agent: Option<String>,
    final_response: Option<String>,
    retry_count: u32,
    validation_result: Option<ValidationResult>,
}

impl ExecutionState {
    /// Fresh state seeded with one user message
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Content::user(prompt)],
            current_agent: None,
            final_response: None,
            retry_count: 0,
            validation_result: None,
        }
    }

    pub fn messages(&self) -> &[Content] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Content> {
        self.messages.last()
    }

    pub fn current_agent(&self) -> Option<&str> {
        self.current_agent.as_deref()
    }

    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn validation_result(&self) -> Option<ValidationResult> {
        self.validation_result
    }

    /// Overwrite the final response (used when a router adopts an answer)
    pub fn set_final_response(&mut self, response: impl Into<String>) {
        self.final_response = Some(response.into());
    }

    /// Merge a node update. Returns the index of the first appended message.
    pub fn apply(&mut self, update: StateUpdate) -> usize {
        let first_new = self.messages.len();
        self.messages.extend(update.messages);

        if let Some(agent) = update.current_agent {
            self.current_agent = Some(agent);
        }
        if let Some(response) = update.final_response {
            self.final_response = Some(response);
        }
        if let Some(result) = update.validation_result {
            self.validation_result = Some(result);
        }
        if let Some(count) = update.retry_count {
            self.retry_count = self.retry_count.max(count);
        }

        first_new
    }
}

/// Partial state produced by one node step
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub messages: Vec<Content>,
    pub current_agent: Option<String>,
    pub final_response: Option<String>,
    pub validation_result: Option<ValidationResult>,
    pub retry_count: Option<u32>,
}

impl StateUpdate {
    /// Update carrying one message produced by `agent`
    pub fn from_agent(agent: &str, message: Content) -> Self {
        Self {
            final_response: Some(message.text()),
            messages: vec![message],
            current_agent: Some(agent.to_string()),
            ..Self::default()
        }
    }

    pub fn with_validation(mut self, result: ValidationResult, retry_count: u32) -> Self {
        self.validation_result = Some(result);
        self.retry_count = Some(retry_count);
        self
    }
}
