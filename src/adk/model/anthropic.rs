//! Anthropic Model - Claude Messages API implementation

use super::{extract_content, Content, GenerationConfig, Model, ModelProvider, Part};
use crate::adk::error::{FabriqError, ModelError};
use crate::adk::tool::Tool;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use std::error::Error;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Claude model implementation
pub struct AnthropicModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl AnthropicModel {
    /// Create a new AnthropicModel from the environment
    ///
    /// Requires `ANTHROPIC_API_KEY`. Optionally uses `ANTHROPIC_BASE_URL`
    /// for custom endpoints.
    pub fn new(model_name: String) -> Result<Self, FabriqError> {
        let provider = AnthropicProvider::from_env()?;
        Ok(provider.build(model_name))
    }

    /// Extract system message from history
    fn extract_system_message(history: &[Content]) -> Option<String> {
        history
            .iter()
            .find(|c| c.role == "system")
            .map(Content::text)
            .filter(|t| !t.is_empty())
    }

    fn api_role(role: &str) -> &str {
        match role {
            "model" => "assistant",
            // tool results travel back inside a user turn
            "tool" => "user",
            other => other,
        }
    }

    fn part_to_block(part: &Part) -> Option<Value> {
        match part {
            Part::Text(t) if t.is_empty() => None,
            Part::Text(t) => Some(json!({ "type": "text", "text": t })),
            // thinking blocks cannot be replayed without their signature
            Part::Thinking(_) => None,
            Part::FunctionCall { id, name, args } => Some(json!({
                "type": "tool_use",
                "id": id.clone().unwrap_or_else(|| format!("toolu_{}", name)),
                "name": name,
                "input": args
            })),
            Part::FunctionResponse { id, name, response } => Some(json!({
                "type": "tool_result",
                "tool_use_id": id.clone().unwrap_or_else(|| format!("toolu_{}", name)),
                "content": extract_content(response)
            })),
        }
    }

    /// Convert history to Anthropic messages.
    ///
    /// System messages are dropped (sent separately) and consecutive
    /// messages with the same API role are merged into one turn.
    fn build_messages(history: &[Content]) -> Vec<Value> {
        let mut messages: Vec<(String, Vec<Value>)> = Vec::new();

        for content in history.iter().filter(|c| c.role != "system") {
            let role = Self::api_role(&content.role);
            let blocks: Vec<Value> = content
                .parts
                .iter()
                .filter_map(Self::part_to_block)
                .collect();
            if blocks.is_empty() {
                continue;
            }

            match messages.last_mut() {
                Some((last_role, last_blocks)) if last_role == role => last_blocks.extend(blocks),
                _ => messages.push((role.to_string(), blocks)),
            }
        }

        messages
            .into_iter()
            .map(|(role, content)| json!({ "role": role, "content": content }))
            .collect()
    }

    /// Convert tools to Anthropic tool format
    fn tools_to_anthropic_format(tools: &[Arc<dyn Tool>]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.schema()
                })
            })
            .collect()
    }

    /// Parse Anthropic response into Content
    fn parse_anthropic_response(response: &Value) -> Result<Content, ModelError> {
        let content_blocks = response["content"].as_array().ok_or_else(|| {
            ModelError::InvalidResponse("No content in Anthropic response".to_string())
        })?;

        let mut parts = Vec::new();

        for block in content_blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(text) = block["text"].as_str() {
                        if !text.is_empty() {
                            parts.push(Part::Text(text.to_string()));
                        }
                    }
                }
                Some("thinking") => {
                    if let Some(thinking) = block["thinking"].as_str() {
                        parts.push(Part::Thinking(thinking.to_string()));
                    }
                }
                Some("tool_use") => {
                    let name = block["name"].as_str().ok_or_else(|| {
                        ModelError::InvalidResponse("tool_use block without a name".to_string())
                    })?;
                    parts.push(Part::FunctionCall {
                        id: block["id"].as_str().map(str::to_string),
                        name: name.to_string(),
                        args: block["input"].clone(),
                    });
                }
                other => log::debug!("Ignoring Anthropic content block {:?}", other),
            }
        }

        if let Some(stop_reason) = response["stop_reason"].as_str() {
            log::debug!("Anthropic stop reason: {}", stop_reason);
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for AnthropicModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<Content, Box<dyn Error + Send + Sync>> {
        let url = format!("{}/messages", self.base_url);

        let mut body = json!({
            "model": self.model_name,
            "messages": Self::build_messages(history),
            "max_tokens": config
                .and_then(|c| c.max_output_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS)
        });

        if let Some(sys) = Self::extract_system_message(history) {
            body["system"] = json!(sys);
        }

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
            if let Some(top_k) = cfg.top_k {
                body["top_k"] = json!(top_k);
            }
        }

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = json!(Self::tools_to_anthropic_format(tools));
        }

        log::debug!(
            "Anthropic request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(Box::new(ModelError::Status {
                provider: "Anthropic".to_string(),
                status: status.as_u16(),
                body: text,
            }));
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("Anthropic response: {}", resp_json);

        Ok(Self::parse_anthropic_response(&resp_json)?)
    }
}

/// Builds [`AnthropicModel`]s that share one HTTP client and API key
#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Read `ANTHROPIC_API_KEY` and `ANTHROPIC_BASE_URL`
    pub fn from_env() -> Result<Self, FabriqError> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ModelError::ApiKeyMissing("Anthropic".to_string()))?;
        Ok(Self::new(api_key, env::var("ANTHROPIC_BASE_URL").ok()))
    }

    fn build(&self, model_name: String) -> AnthropicModel {
        AnthropicModel {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            model_name,
            base_url: self.base_url.clone(),
        }
    }
}

impl ModelProvider for AnthropicProvider {
    fn model(&self, model_name: &str) -> Result<Arc<dyn Model>, FabriqError> {
        Ok(Arc::new(self.build(model_name.to_string())))
    }
}
