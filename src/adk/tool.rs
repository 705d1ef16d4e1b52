use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;

/// Trait for tools that can be called by agents.
///
/// A failing `execute` is not fatal to the caller: the agent loop feeds
/// the error text back to the model as the tool's result.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name (must be unique within a registry)
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's input parameters
    fn schema(&self) -> &Value;

    /// Execute the tool with the given input and return the result
    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>>;
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Correlation id used to pair the result with the request
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
}
