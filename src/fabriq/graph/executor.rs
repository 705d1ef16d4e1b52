// SPDX-License-Identifier: MIT

//! Run executor - drives one compiled graph and streams run events
//!
//! Steps run strictly one at a time. Each step's state update is turned
//! into caller-visible events; the stream always ends with `done`, and
//! failures surface as an `error` event rather than a Rust error.

use super::compiler::{CompiledGraph, Edge};
use super::router::{Route, RoutingPayload, Termination};
use super::state::{ExecutionState, ValidationResult};
use crate::adk::error::FabriqError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Default cap on model-decided hand-offs per run
pub const MAX_ITERATIONS: u32 = 5;

const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    Token,
    ValidationRejected,
    Error,
    Done,
}

/// One caller-visible unit of run progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: String,
    #[serde(default)]
    pub agent: Option<String>,
}

impl RunEvent {
    fn new(kind: EventKind, content: impl Into<String>, agent: Option<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            agent,
        }
    }

    pub fn status(agent: &str) -> Self {
        Self::new(
            EventKind::Status,
            format!("Agent '{}' processing...", agent),
            Some(agent.to_string()),
        )
    }

    pub fn token(content: impl Into<String>, agent: Option<String>) -> Self {
        Self::new(EventKind::Token, content, agent)
    }

    pub fn validation_rejected(agent: &str) -> Self {
        Self::new(
            EventKind::ValidationRejected,
            "Pipeline output rejected, retrying...",
            Some(agent.to_string()),
        )
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(EventKind::Error, content, None)
    }

    pub fn done() -> Self {
        Self::new(EventKind::Done, "", None)
    }
}

/// Text worth showing the caller, or `None` for routing chatter.
///
/// JSON carrying an `agent` or `delegate` key is routing; only a
/// terminating orchestrator payload's embedded response is kept.
pub fn surfaced_content(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(obj)) if obj.contains_key("agent") || obj.contains_key("delegate") => {
            RoutingPayload::parse(text).and_then(|p| p.done_response())
        }
        _ => Some(text.to_string()),
    }
}

/// Receiver hung up; the run is abandoned
struct Disconnected;

async fn emit(tx: &mpsc::Sender<RunEvent>, event: RunEvent) -> Result<(), Disconnected> {
    tx.send(event).await.map_err(|_| Disconnected)
}

#[derive(Debug, Clone)]
pub struct RunExecutor {
    max_iterations: Option<u32>,
}

impl Default for RunExecutor {
    fn default() -> Self {
        Self {
            max_iterations: Some(MAX_ITERATIONS),
        }
    }
}

impl RunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` disables the hand-off cap
    pub fn with_max_iterations(mut self, max_iterations: Option<u32>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run `graph` on a background task and stream its events
    pub fn stream(&self, graph: Arc<CompiledGraph>, prompt: String) -> ReceiverStream<RunEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let executor = self.clone();
        tokio::spawn(async move {
            executor.run(&graph, &prompt, &tx).await;
        });
        ReceiverStream::new(rx)
    }

    /// Drive `graph` to completion, sending events to `tx`
    pub async fn run(&self, graph: &CompiledGraph, prompt: &str, tx: &mpsc::Sender<RunEvent>) {
        match self.drive(graph, prompt, tx).await {
            Ok(Ok(())) => log::info!("Run of '{}' finished", graph.name()),
            Ok(Err(Disconnected)) => {
                log::info!("Run of '{}' abandoned by caller", graph.name());
                return;
            }
            Err(e) => {
                log::error!("Graph execution error in '{}': {}", graph.name(), e);
                let event = RunEvent::error(format!("Execution error: {}", e));
                if emit(tx, event).await.is_err() {
                    return;
                }
            }
        }
        let _ = emit(tx, RunEvent::done()).await;
    }

    async fn drive(
        &self,
        graph: &CompiledGraph,
        prompt: &str,
        tx: &mpsc::Sender<RunEvent>,
    ) -> Result<Result<(), Disconnected>, FabriqError> {
        let mut state = ExecutionState::new(prompt);
        let mut current = graph.entry().to_string();
        let mut last_agent: Option<String> = None;
        let mut answer: Option<String> = None;
        let mut hand_offs = 0u32;

        loop {
            let node = graph
                .node(&current)
                .ok_or_else(|| FabriqError::run(format!("Unknown node '{}'", current)))?;

            let update = node.executor.execute(&state).await;
            let rejected = update.validation_result == Some(ValidationResult::Rejected);
            let first_new = state.apply(update);
            let active = state.current_agent().unwrap_or(&current).to_string();

            if last_agent.as_deref().is_some_and(|prev| prev != active) {
                if let Err(e) = emit(tx, RunEvent::status(&active)).await {
                    return Ok(Err(e));
                }
            }
            last_agent = Some(active.clone());

            if rejected {
                if let Err(e) = emit(tx, RunEvent::validation_rejected(&active)).await {
                    return Ok(Err(e));
                }
            }

            for message in &state.messages()[first_new..] {
                if let Some(text) = surfaced_content(&message.text()) {
                    answer = Some(text);
                }
            }

            let decision = graph.next(&current, &state)?;
            if let Some(response) = decision.final_response {
                state.set_final_response(response.clone());
                answer = Some(response);
            }

            match decision.route {
                Route::To(next) => {
                    let model_decided = match &node.edge {
                        Edge::Conditional(router) => router.counts_toward_iteration_cap(),
                        _ => false,
                    };
                    if model_decided {
                        hand_offs += 1;
                        if let Some(limit) = self.max_iterations {
                            if hand_offs > limit {
                                return Err(FabriqError::MaxIterations {
                                    kind: "routing iterations".to_string(),
                                    limit,
                                });
                            }
                        }
                    }
                    log::debug!("Routing {} -> {}", current, next);
                    current = next;
                }
                Route::End(Termination::RetriesExhausted) => {
                    let event = RunEvent::error(format!(
                        "Pipeline output rejected {} times, giving up",
                        state.retry_count()
                    ));
                    return Ok(emit(tx, event).await);
                }
                Route::End(_) => {
                    if let Some(answer) = answer {
                        return Ok(emit(tx, RunEvent::token(answer, last_agent)).await);
                    }
                    return Ok(Ok(()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::Content;
    use crate::fabriq::config::Topology;
    use crate::fabriq::graph::{CompiledNode, NodeExecutor, NodeKind, StateUpdate};
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;

    /// Node that always answers with the same text
    struct FixedNode {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl NodeExecutor for FixedNode {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> NodeKind {
            NodeKind::Agent
        }

        async fn execute(&self, _state: &ExecutionState) -> StateUpdate {
            StateUpdate::from_agent(self.name, Content::model(self.reply))
        }
    }

    fn end() -> Edge {
        Edge::Static(Route::End(Termination::Done))
    }

    fn to(next: &str) -> Edge {
        Edge::Static(Route::To(next.to_string()))
    }

    fn graph(nodes: Vec<(&'static str, &'static str, Edge)>) -> Arc<CompiledGraph> {
        let entry = nodes[0].0;
        let nodes = nodes
            .into_iter()
            .map(|(name, reply, edge)| {
                let node = FixedNode { name, reply };
                CompiledNode::new(Arc::new(node), edge)
            })
            .collect();
        let graph = CompiledGraph::new("test", Topology::Sequential, entry, nodes);
        Arc::new(graph.unwrap())
    }

    async fn collect(graph: Arc<CompiledGraph>) -> Vec<RunEvent> {
        RunExecutor::new()
            .stream(graph, "q".to_string())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_stream_single_node() {
        let events = collect(graph(vec![("solo", "42", end())])).await;

        assert_eq!(
            events,
            vec![
                RunEvent::token("42", Some("solo".to_string())),
                RunEvent::done(),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_reports_agent_changes() {
        let graph = graph(vec![
            ("writer", "a draft", to("reviewer")),
            ("reviewer", "final copy", end()),
        ]);

        let events = collect(graph).await;

        assert_eq!(
            events,
            vec![
                RunEvent::status("reviewer"),
                RunEvent::token("final copy", Some("reviewer".to_string())),
                RunEvent::done(),
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_abandons_run() {
        let graph = graph(vec![("solo", "42", end())]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        // returns instead of blocking on a closed channel
        RunExecutor::new().run(&graph, "q", &tx).await;
    }

    #[test]
    fn test_event_wire_shape() {
        let event = RunEvent::token("42", Some("coder_0".to_string()));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "token", "content": "42", "agent": "coder_0"})
        );
        assert_eq!(
            serde_json::to_value(RunEvent::validation_rejected("v")).unwrap()["type"],
            "validation_rejected"
        );
        assert_eq!(
            serde_json::to_value(RunEvent::done()).unwrap(),
            json!({"type": "done", "content": "", "agent": null})
        );
    }

    #[test]
    fn test_surfaced_content_hides_routing() {
        assert_eq!(surfaced_content(r#"{"agent": "writer_1"}"#), None);
        let delegation = r#"{"delegate": "coder_0", "message": "x"}"#;
        assert_eq!(surfaced_content(delegation), None);
        assert_eq!(surfaced_content(r#"{"agent": "__done__"}"#), None);
        assert_eq!(surfaced_content(""), None);
    }

    #[test]
    fn test_surfaced_content_keeps_answers() {
        assert_eq!(
            surfaced_content(r#"{"agent": "__done__", "response": "X"}"#).as_deref(),
            Some("X")
        );
        assert_eq!(
            surfaced_content("plain prose").as_deref(),
            Some("plain prose")
        );
        assert_eq!(
            surfaced_content(r#"{"score": 3}"#).as_deref(),
            Some(r#"{"score": 3}"#)
        );
    }
}
