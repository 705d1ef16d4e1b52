// SPDX-License-Identifier: MIT

//! LLM Agent - model invocation plus tool-call loop
//!
//! Every graph node drives its model through [`LLMAgent::run_turns`]: the
//! model is called repeatedly, requested tools are executed and their
//! results appended, until the model answers without asking for tools.

use crate::adk::error::FabriqError;
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::adk::tool::{Tool, ToolCall};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Default cap on model turns inside one loop
pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Result of one tool-call loop
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The model's final response
    pub response: Content,
    /// Tool result messages produced during this loop, in order
    pub tool_results: Vec<Content>,
}

/// LLM agent with tool calling support
pub struct LLMAgent {
    pub name: String,
    pub instruction: String,
    pub model: Arc<dyn Model>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub config: GenerationConfig,
    pub max_turns: u32,
    /// HashMap for O(1) tool lookups
    tool_map: HashMap<String, usize>,
}

impl LLMAgent {
    pub fn new(
        name: String,
        instruction: String,
        model: Arc<dyn Model>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Self {
        let tool_map: HashMap<String, usize> = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();

        Self {
            name,
            instruction,
            model,
            tools,
            config: GenerationConfig {
                max_output_tokens: Some(4096),
                ..GenerationConfig::default()
            },
            max_turns: DEFAULT_MAX_TURNS,
            tool_map,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// O(1) tool lookup by name
    fn get_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tool_map.get(name).map(|&i| &self.tools[i])
    }

    fn bound_tools(&self) -> Option<&[Arc<dyn Tool>]> {
        if self.tools.is_empty() {
            None
        } else {
            Some(&self.tools)
        }
    }

    async fn invoke(
        &self,
        messages: &[Content],
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<Content, FabriqError> {
        self.model
            .generate_content(messages, Some(&self.config), tools)
            .await
            .map_err(FabriqError::model_invocation)
    }

    /// Execute one requested tool.
    ///
    /// A missing tool is an error; a failing tool becomes result text so the
    /// model can react to it.
    async fn call_tool(&self, call: &ToolCall) -> Result<Value, FabriqError> {
        let tool = self
            .get_tool(&call.name)
            .ok_or_else(|| FabriqError::unknown_tool(&call.name))?;

        log::info!(
            "Agent '{}' tool call: {} {}",
            self.name,
            call.name,
            call.args
        );
        match tool.execute(call.args.clone()).await {
            Ok(result) => Ok(result),
            Err(e) => {
                log::error!("Tool {} failed: {}", call.name, e);
                Ok(Value::String(format!("Error: {}", e)))
            }
        }
    }

    /// Run the tool-call loop over `history`.
    ///
    /// The system instruction is prepended; `history` itself is not modified.
    pub async fn run_turns(&self, history: &[Content]) -> Result<TurnOutcome, FabriqError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Content::system(self.instruction.clone()));
        messages.extend_from_slice(history);

        let mut tool_results = Vec::new();
        let mut final_response = None;

        for turn in 0..self.max_turns {
            log::debug!("Agent '{}' turn {}/{}", self.name, turn + 1, self.max_turns);
            let response = self.invoke(&messages, self.bound_tools()).await?;

            let calls = response.function_calls();
            if calls.is_empty() {
                final_response = Some(response);
                break;
            }

            messages.push(response);
            for call in &calls {
                let result = Content::tool_result(call, self.call_tool(call).await?);
                tool_results.push(result.clone());
                messages.push(result);
            }
        }

        let mut response = match final_response {
            Some(response) => response,
            None => {
                log::error!(
                    "Agent '{}' reached max turns without a final answer",
                    self.name
                );
                return Err(FabriqError::MaxIterations {
                    kind: "turns".to_string(),
                    limit: self.max_turns,
                });
            }
        };

        if !self.tools.is_empty() && response.text().is_empty() {
            log::warn!(
                "Agent '{}' returned empty content after tool use, retrying for text",
                self.name
            );
            response = self.invoke(&messages, None).await?;
        }

        Ok(TurnOutcome {
            response,
            tool_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::Part;
    use async_trait::async_trait;
    use once_cell::sync::Lazy;
    use serde_json::json;
    use std::error::Error;
    use std::sync::Mutex;

    static ECHO_SCHEMA: Lazy<Value> = Lazy::new(|| json!({"type": "object", "properties": {}}));

    /// Replays canned responses and records whether tools were bound
    struct ScriptedModel {
        responses: Mutex<Vec<Content>>,
        tools_bound: Mutex<Vec<bool>>,
        history_lens: Mutex<Vec<usize>>,
    }

    impl ScriptedModel {
        fn new(mut responses: Vec<Content>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                tools_bound: Mutex::new(Vec::new()),
                history_lens: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn generate_content(
            &self,
            history: &[Content],
            _config: Option<&GenerationConfig>,
            tools: Option<&[Arc<dyn Tool>]>,
        ) -> Result<Content, Box<dyn Error + Send + Sync>> {
            self.tools_bound.lock().unwrap().push(tools.is_some());
            self.history_lens.lock().unwrap().push(history.len());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| "script exhausted".into())
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input"
        }

        fn schema(&self) -> &Value {
            &ECHO_SCHEMA
        }

        async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
            match input.get("fail") {
                Some(_) => Err("boom".into()),
                None => Ok(json!(format!("echo:{}", input["text"].as_str().unwrap_or("")))),
            }
        }
    }

    fn call(name: &str, args: Value) -> Content {
        Content {
            role: "model".to_string(),
            parts: vec![Part::FunctionCall {
                id: Some(format!("id_{}", name)),
                name: name.to_string(),
                args,
            }],
        }
    }

    fn agent(model: Arc<ScriptedModel>, tools: Vec<Arc<dyn Tool>>) -> LLMAgent {
        LLMAgent::new("tester".to_string(), "Be brief".to_string(), model, tools)
    }

    #[tokio::test]
    async fn test_plain_answer_exits_immediately() {
        let model = Arc::new(ScriptedModel::new(vec![Content::model("42")]));
        let outcome = agent(model.clone(), vec![])
            .run_turns(&[Content::user("q")])
            .await
            .unwrap();

        assert_eq!(outcome.response.text(), "42");
        assert!(outcome.tool_results.is_empty());
        // system + user
        assert_eq!(*model.history_lens.lock().unwrap(), vec![2]);
        assert_eq!(*model.tools_bound.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_tool_results_are_collected_in_order() {
        let model = Arc::new(ScriptedModel::new(vec![
            call("echo", json!({"text": "a"})),
            call("echo", json!({"fail": true})),
            Content::model("done"),
        ]));
        let outcome = agent(model.clone(), vec![Arc::new(EchoTool)])
            .run_turns(&[Content::user("q")])
            .await
            .unwrap();

        assert_eq!(outcome.response.text(), "done");
        assert_eq!(outcome.tool_results.len(), 2);
        assert_eq!(outcome.tool_results[0].text(), "echo:a");
        assert_eq!(outcome.tool_results[1].text(), "Error: boom");
        // each turn adds the call and its result
        assert_eq!(*model.history_lens.lock().unwrap(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_loop() {
        let model = Arc::new(ScriptedModel::new(vec![call("missing", json!({}))]));
        let err = agent(model, vec![Arc::new(EchoTool)])
            .run_turns(&[Content::user("q")])
            .await
            .unwrap_err();

        assert!(matches!(err, FabriqError::UnknownTool { ref name } if name == "missing"));
    }

    #[tokio::test]
    async fn test_empty_answer_after_tools_retries_without_tools() {
        let model = Arc::new(ScriptedModel::new(vec![
            call("echo", json!({"text": "a"})),
            Content::model(""),
            Content::model("summary"),
        ]));
        let outcome = agent(model.clone(), vec![Arc::new(EchoTool)])
            .run_turns(&[Content::user("q")])
            .await
            .unwrap();

        assert_eq!(outcome.response.text(), "summary");
        assert_eq!(*model.tools_bound.lock().unwrap(), vec![true, true, false]);
    }

    #[tokio::test]
    async fn test_max_turns_is_error() {
        let model = Arc::new(ScriptedModel::new(vec![
            call("echo", json!({"text": "1"})),
            call("echo", json!({"text": "2"})),
        ]));
        let err = agent(model, vec![Arc::new(EchoTool)])
            .with_max_turns(2)
            .run_turns(&[Content::user("q")])
            .await
            .unwrap_err();

        assert!(matches!(err, FabriqError::MaxIterations { limit: 2, .. }));
    }

    #[tokio::test]
    async fn test_model_failure_is_model_invocation_error() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let err = agent(model, vec![])
            .run_turns(&[Content::user("q")])
            .await
            .unwrap_err();

        assert!(matches!(err, FabriqError::ModelInvocation(_)));
        assert!(err.to_string().contains("script exhausted"));
    }
}
