// SPDX-License-Identifier: MIT

use super::builtins::builtin_tools;
use crate::adk::tool::Tool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name-keyed tool lookup shared by every compiled graph
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry pre-populated with the built-in tools
    pub async fn with_builtins() -> Self {
        let registry = Self::new();
        for tool in builtin_tools() {
            registry.register(tool).await;
        }
        registry
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().await;
        tools.insert(tool.name().to_string(), tool);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// Registered tool names, sorted
    pub async fn names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tools for `names` in order; names without a registered tool are skipped
    pub async fn resolve(&self, names: &[String]) -> Vec<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        names
            .iter()
            .filter_map(|name| {
                let tool = tools.get(name).cloned();
                if tool.is_none() {
                    log::warn!("Tool not found: {}", name);
                }
                tool
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::error::Error;

    use once_cell::sync::Lazy;

    static MOCK_SCHEMA: Lazy<Value> = Lazy::new(|| {
        json!({
            "type": "object",
            "properties": {}
        })
    });

    struct MockTool {
        name: String,
        description: String,
    }

    impl MockTool {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                description: format!("Mock tool: {}", name),
            }
        }
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            &self.description
        }

        fn schema(&self) -> &Value {
            &MOCK_SCHEMA
        }

        async fn execute(&self, _input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
            Ok(json!("mock"))
        }
    }

    #[tokio::test]
    async fn test_register_and_get_tool() {
        let registry = ToolRegistry::new();
        let tool = Arc::new(MockTool::new("test_tool"));
        registry.register(tool).await;

        let retrieved = registry.get("test_tool").await;
        assert_eq!(
            retrieved.map(|t| t.name().to_string()),
            Some("test_tool".to_string())
        );
        assert!(registry.get("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn test_with_builtins() {
        let registry = ToolRegistry::with_builtins().await;
        assert_eq!(
            registry.names().await,
            vec!["accept_output", "calculate", "reject_output"]
        );
    }

    #[tokio::test]
    async fn test_resolve_keeps_order_and_skips_missing() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool::new("b"))).await;
        registry.register(Arc::new(MockTool::new("a"))).await;

        let names = vec!["a".to_string(), "ghost".to_string(), "b".to_string()];
        let tools = registry.resolve(&names).await;
        let resolved: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(resolved, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_registry_is_clone() {
        let registry = ToolRegistry::new();
        let cloned = registry.clone();

        // clones share storage
        cloned.register(Arc::new(MockTool::new("tool2"))).await;
        assert!(registry.get("tool2").await.is_some());
    }
}
