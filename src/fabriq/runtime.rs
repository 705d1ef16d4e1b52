// SPDX-License-Identifier: MIT

//! Runtime - turns endpoint requests into graph runs
//!
//! Validates request data against an endpoint contract, renders the
//! endpoint's prompt template and runs the target system.

use crate::adk::error::FabriqError;
use crate::fabriq::agents::{resolve_all, AgentTypeRegistry};
use crate::fabriq::config::{ContractField, FieldType, SystemConfig};
use crate::fabriq::graph::{CompiledGraph, GraphCache, RunEvent, RunExecutor};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check that every contract field is present with the declared type
pub fn validate_contract(
    contract: &[ContractField],
    data: &Map<String, Value>,
) -> Result<(), FabriqError> {
    for field in contract {
        let value = data.get(&field.name).ok_or_else(|| {
            FabriqError::Contract(format!(
                "Missing required field '{}' (expected type: {})",
                field.name, field.field_type
            ))
        })?;

        let matches = match field.field_type {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
        };
        if !matches {
            return Err(FabriqError::Contract(format!(
                "Field '{}' must be of type {}, got {}",
                field.name,
                field.field_type,
                json_type_name(value)
            )));
        }
    }
    Ok(())
}

/// Substitute `{key}` placeholders; `{{` and `}}` are literal braces
fn substitute(template: &str, data: &Map<String, Value>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next()? {
                        '}' => break,
                        ch => key.push(ch),
                    }
                }
                match data.get(key.trim())? {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
            }
            // a lone closing brace is malformed
            '}' => return None,
            _ => out.push(c),
        }
    }
    Some(out)
}

/// Fill the prompt template with request data.
///
/// Strings are inserted as-is; other values are written as JSON text
/// (`true`, `3.5`, `null`, `["a","b"]`). If any placeholder cannot be
/// filled, the raw template is returned followed by the pretty-printed data.
pub fn render_prompt(template: &str, data: &Map<String, Value>) -> String {
    match substitute(template, data) {
        Some(prompt) => prompt,
        None => {
            log::warn!("Template placeholders could not be filled, appending raw data");
            let pretty = serde_json::to_string_pretty(data).unwrap_or_default();
            format!("{}\n\nData:\n{}", template, pretty)
        }
    }
}

/// Resolves systems into cached graphs and runs them
#[derive(Clone)]
pub struct Engine {
    agent_types: Arc<AgentTypeRegistry>,
    cache: Arc<GraphCache>,
    executor: RunExecutor,
}

impl Engine {
    pub fn new(
        agent_types: Arc<AgentTypeRegistry>,
        cache: Arc<GraphCache>,
        executor: RunExecutor,
    ) -> Self {
        Self {
            agent_types,
            cache,
            executor,
        }
    }

    pub fn agent_types(&self) -> &Arc<AgentTypeRegistry> {
        &self.agent_types
    }

    pub fn cache(&self) -> &Arc<GraphCache> {
        &self.cache
    }

    /// Resolve the system's agents and fetch or build its graph
    pub async fn prepare(&self, system: &SystemConfig) -> Result<Arc<CompiledGraph>, FabriqError> {
        let agents = resolve_all(&self.agent_types, &system.agents)?;
        self.cache.get_or_build(system, &agents).await
    }

    /// Prepare `system` and stream a run of it on `prompt`.
    ///
    /// Resolution and compilation failures become `error`, `done`.
    pub async fn execute_run(
        &self,
        system: &SystemConfig,
        prompt: String,
    ) -> ReceiverStream<RunEvent> {
        let run_id = Uuid::new_v4();
        log::info!(
            "Executing run {}: system={}, topology={}",
            run_id,
            system.id,
            system.topology
        );

        match self.prepare(system).await {
            Ok(graph) => self.executor.stream(graph, prompt),
            Err(e) => {
                log::error!("Run {} failed to build graph: {}", run_id, e);
                build_failure(&e)
            }
        }
    }
}

fn build_failure(error: &FabriqError) -> ReceiverStream<RunEvent> {
    let (tx, rx) = mpsc::channel(2);
    let events = [
        RunEvent::error(format!("Graph build error: {}", error)),
        RunEvent::done(),
    ];
    for event in events {
        // capacity covers both events
        let _ = tx.try_send(event);
    }
    ReceiverStream::new(rx)
}
