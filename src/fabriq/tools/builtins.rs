// SPDX-License-Identifier: MIT

//! Built-in tools: validator verdicts and arithmetic

use super::calculator;
use crate::adk::tool::Tool;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;

/// Tool result marker for an accepted pipeline output
pub const ACCEPTED_SENTINEL: &str = "__ACCEPTED__";
/// Tool result prefix for a rejected pipeline output, followed by the reason
pub const REJECTED_SENTINEL: &str = "__REJECTED__:";

static ACCEPT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "message": {
                "type": "string",
                "description": "Optional note about why the output is accepted"
            }
        }
    })
});

static REJECT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "reason": {
                "type": "string",
                "description": "What is wrong with the output"
            }
        },
        "required": ["reason"]
    })
});

static CALCULATE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "expression": {
                "type": "string",
                "description": "Arithmetic expression, e.g. (2 + 3) * 4 or round(10 / 3, 2)"
            }
        },
        "required": ["expression"]
    })
});

pub struct AcceptOutputTool;

#[async_trait]
impl Tool for AcceptOutputTool {
    fn name(&self) -> &str {
        "accept_output"
    }

    fn description(&self) -> &str {
        "Signal that the pipeline output is valid. Call this to accept and forward the output."
    }

    fn schema(&self) -> &Value {
        &ACCEPT_SCHEMA
    }

    async fn execute(&self, _input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        Ok(json!(ACCEPTED_SENTINEL))
    }
}

pub struct RejectOutputTool;

#[async_trait]
impl Tool for RejectOutputTool {
    fn name(&self) -> &str {
        "reject_output"
    }

    fn description(&self) -> &str {
        "Signal that the pipeline output is invalid. Call this to reject and restart the pipeline."
    }

    fn schema(&self) -> &Value {
        &REJECT_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let reason = input
            .get("reason")
            .and_then(Value::as_str)
            .ok_or("Missing 'reason' argument")?;
        Ok(json!(format!("{} {}", REJECTED_SENTINEL, reason)))
    }
}

pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate a mathematical expression and return the result."
    }

    fn schema(&self) -> &Value {
        &CALCULATE_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let expression = input
            .get("expression")
            .and_then(Value::as_str)
            .ok_or("Missing 'expression' argument")?;
        let text = match calculator::evaluate(expression) {
            Ok(value) => calculator::format_number(value),
            Err(e) => format!("Error evaluating '{}': {}", expression, e),
        };
        Ok(json!(text))
    }
}

/// All built-in tools
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(AcceptOutputTool),
        Arc::new(RejectOutputTool),
        Arc::new(CalculateTool),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accept_output() {
        let result = AcceptOutputTool.execute(json!({})).await.unwrap();
        assert_eq!(result, json!("__ACCEPTED__"));
    }

    #[tokio::test]
    async fn test_reject_output_carries_reason() {
        let result = RejectOutputTool
            .execute(json!({"reason": "too short"}))
            .await
            .unwrap();
        assert_eq!(result, json!("__REJECTED__: too short"));
    }

    #[tokio::test]
    async fn test_reject_output_requires_reason() {
        assert!(RejectOutputTool.execute(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_calculate() {
        let result = CalculateTool
            .execute(json!({"expression": "(2 + 3) * 4"}))
            .await
            .unwrap();
        assert_eq!(result, json!("20"));
    }

    #[tokio::test]
    async fn test_calculate_error_is_text() {
        let result = CalculateTool
            .execute(json!({"expression": "1 / 0"}))
            .await
            .unwrap();
        assert_eq!(result, json!("Error evaluating '1 / 0': division by zero"));
    }
}
