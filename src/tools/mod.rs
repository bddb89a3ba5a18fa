//! Tool trait and registry
//!
//! In-process tools for embedding without an MCP server. The registry is a
//! `ToolTransport`, so the tool agent cannot tell it apart from a remote one.

use crate::error::OrchestrationError;
use crate::models::ToolDescriptor;
use crate::transport::{require_name, ToolOutcome, ToolTransport};
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Trait for a single tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object
    fn input_schema(&self) -> Value;
    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolTransport for ToolRegistry {
    async fn fetch_capabilities(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self
            .list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema().to_string(),
            })
            .collect())
    }

    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutcome> {
        require_name(name)?;

        let tool = self.get(name).ok_or_else(|| {
            OrchestrationError::InvocationError(format!("Unknown tool: {}", name))
        })?;

        match tool.execute(&arguments).await {
            Ok(text) => Ok(ToolOutcome {
                succeeded: true,
                text,
            }),
            Err(e) => {
                debug!(tool = name, "Tool failed: {}", e);
                Ok(ToolOutcome {
                    succeeded: false,
                    text: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct PriceTool;

    #[async_trait]
    impl Tool for PriceTool {
        fn name(&self) -> &str {
            "get_price"
        }

        fn description(&self) -> &str {
            "Latest closing price for a SET symbol"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"symbol": {"type": "string"}}})
        }

        async fn execute(&self, arguments: &Map<String, Value>) -> Result<String> {
            match arguments.get("symbol").and_then(|v| v.as_str()) {
                Some("KBANK") => Ok("152.50".to_string()),
                Some(other) => Err(OrchestrationError::InvocationError(format!(
                    "no price for {}",
                    other
                ))),
                None => Err(OrchestrationError::InvocationError(
                    "symbol is required".to_string(),
                )),
            }
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PriceTool));
        registry
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_registry_describes_tools() {
        let tools = registry().fetch_capabilities().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "get_price");
        assert!(tools[0].input_schema.contains("symbol"));
    }

    #[tokio::test]
    async fn test_successful_invocation() {
        let outcome = registry()
            .invoke("get_price", args(json!({"symbol": "KBANK"})))
            .await
            .unwrap();
        assert!(outcome.succeeded);
        assert_eq!(outcome.text, "152.50");
    }

    #[tokio::test]
    async fn test_tool_failure_is_unsuccessful_outcome() {
        let outcome = registry()
            .invoke("get_price", args(json!({"symbol": "XXX"})))
            .await
            .unwrap();
        assert!(!outcome.succeeded);
        assert!(outcome.text.contains("no price for XXX"));
    }

    #[tokio::test]
    async fn test_unknown_and_missing_names_are_invocation_errors() {
        let registry = registry();
        assert!(matches!(
            registry.invoke("nope", Map::new()).await,
            Err(OrchestrationError::InvocationError(_))
        ));
        assert!(matches!(
            registry.invoke("", Map::new()).await,
            Err(OrchestrationError::InvocationError(_))
        ));
    }
}
