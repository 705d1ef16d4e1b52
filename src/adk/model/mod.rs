// SPDX-License-Identifier: MIT

//! Model module - defines the LLM model capability and message types
//!
//! The engine only needs two things from a model: send it a conversation
//! (system instruction first, then history) with optional bound tools, and
//! get back either text or a set of requested tool invocations.
//!
//! Implementations:
//! - [anthropic] - Anthropic's Messages API

pub mod anthropic;

use crate::adk::error::FabriqError;
use crate::adk::tool::{Tool, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::sync::Arc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// A message in the conversation
///
/// Roles used by the engine: `system`, `user`, `model`, `tool`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// Parts of a message - text, thinking, function calls, etc.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models
    Thinking(String),
    /// Function/tool call requested by the model
    FunctionCall {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        args: Value,
    },
    /// Response from executing a function/tool
    FunctionResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        response: Value,
    },
}

impl Content {
    fn text_message(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text_message("system", text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text_message("user", text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::text_message("model", text)
    }

    /// Tool result message answering `call`
    pub fn tool_result(call: &ToolCall, response: Value) -> Self {
        Self {
            role: "tool".to_string(),
            parts: vec![Part::FunctionResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response,
            }],
        }
    }

    /// Tool invocations requested in this message, in order
    pub fn function_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionCall { id, name, args } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    args: args.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn has_function_calls(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::FunctionCall { .. }))
    }

    /// Plain text of this message.
    ///
    /// Text fragments are joined with newlines; tool responses contribute
    /// their normalized result text. Thinking and call requests are not
    /// part of the answer.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(t) => Some(t.clone()),
                Part::FunctionResponse { response, .. } => Some(extract_content(response)),
                _ => None,
            })
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Normalize a raw message body into one plain string.
///
/// Bodies are either a single string or a list of typed blocks such as
/// `{"type": "text", "text": "..."}`. Block texts are joined with newlines;
/// blocks without a `text` field are rendered as JSON.
pub fn extract_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(blocks) => blocks
            .iter()
            .map(|block| match block {
                Value::String(s) => s.clone(),
                Value::Object(obj) => match obj.get("text").and_then(Value::as_str) {
                    Some(text) => text.to_string(),
                    None => block.to_string(),
                },
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Core trait for LLM model implementations
///
/// `history` starts with the system instruction (role `system`) when the
/// caller has one. Passing `tools: None` asks for a text-only answer.
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<Content, Box<dyn Error + Send + Sync>>;
}

/// Resolves a model identifier (e.g. `claude-sonnet-4-20250514`) to a model
pub trait ModelProvider: Send + Sync {
    fn model(&self, model_name: &str) -> Result<Arc<dyn Model>, FabriqError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_plain_string_is_unchanged() {
        let text = "already plain\nwith two lines";
        let once = extract_content(&json!(text));
        assert_eq!(once, text);
        assert_eq!(extract_content(&json!(once)), text);
    }

    #[test]
    fn test_extract_text_blocks() {
        let body = json!([
            {"type": "text", "text": "first"},
            {"type": "text", "text": "second"}
        ]);
        assert_eq!(extract_content(&body), "first\nsecond");
    }

    #[test]
    fn test_extract_unrecognized_block_falls_back_to_json() {
        let body = json!([{"type": "image", "source": "x"}, "tail"]);
        let text = extract_content(&body);
        assert!(text.contains("\"image\""));
        assert!(text.ends_with("\ntail"));
    }

    #[test]
    fn test_extract_object_and_null() {
        assert_eq!(extract_content(&Value::Null), "");
        assert_eq!(extract_content(&json!({"score": 3})), r#"{"score":3}"#);
    }

    #[test]
    fn test_content_text_skips_calls_and_thinking() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![
                Part::Thinking("hmm".to_string()),
                Part::Text("Answer".to_string()),
                Part::FunctionCall {
                    id: Some("c1".to_string()),
                    name: "search".to_string(),
                    args: json!({}),
                },
                Part::Text("more".to_string()),
            ],
        };
        assert_eq!(content.text(), "Answer\nmore");
        assert!(content.has_function_calls());
    }

    #[test]
    fn test_content_text_of_empty_parts_is_empty() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![Part::Text(String::new()), Part::Text(String::new())],
        };
        assert_eq!(content.text(), "");
    }

    #[test]
    fn test_tool_result_keeps_correlation_id() {
        let call = ToolCall {
            id: Some("toolu_1".to_string()),
            name: "accept_output".to_string(),
            args: json!({}),
        };
        let msg = Content::tool_result(&call, json!("__ACCEPTED__"));
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.text(), "__ACCEPTED__");
        match &msg.parts[0] {
            Part::FunctionResponse { id, name, .. } => {
                assert_eq!(id.as_deref(), Some("toolu_1"));
                assert_eq!(name, "accept_output");
            }
            _ => panic!("Expected FunctionResponse part"),
        }
    }

    #[test]
    fn test_function_calls_in_order() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![
                Part::FunctionCall {
                    id: None,
                    name: "a".to_string(),
                    args: json!({"x": 1}),
                },
                Part::FunctionCall {
                    id: None,
                    name: "b".to_string(),
                    args: json!({}),
                },
            ],
        };
        let calls = content.function_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "a");
        assert_eq!(calls[1].name, "b");
    }
}
