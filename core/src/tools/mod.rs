//! The tool capability and its registry.

pub mod builtin;
pub mod skill_tool;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON-schema-shaped parameter description, passed to the model as
    /// the tool's function-calling declaration.
    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn call(&self, args: &Value) -> Result<String>;
}

/// Enumerates available tools by name. Tools are stored as `Arc<dyn
/// Tool>` rather than `Box<dyn Tool>` so a lookup can hand the caller a
/// cheaply-cloneable handle instead of a borrowed reference tied to a
/// registry lock.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    pub fn specs(&self) -> Vec<crate::model::ToolSpec> {
        self.tools
            .values()
            .map(|t| crate::model::ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }
}

pub struct ToolRegistryBuilder {
    registry: ToolRegistry,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self { registry: ToolRegistry::new() }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.registry.register(tool);
        self
    }

    pub fn build(self) -> ToolRegistry {
        self.registry
    }
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        async fn call(&self, args: &Value) -> Result<String> {
            Ok(args.to_string())
        }
    }

    #[test]
    fn register_then_get_returns_cloneable_handle() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let first = registry.get("echo").unwrap();
        let second = registry.get("echo").unwrap();
        assert_eq!(first.name(), second.name());
    }

    #[test]
    fn missing_tool_returns_none() {
        let registry = ToolRegistry::new();
        assert!(registry.get("nope").is_none());
    }

    #[tokio::test]
    async fn builder_assembles_registry() {
        let registry = ToolRegistryBuilder::new().with_tool(Arc::new(EchoTool)).build();
        assert_eq!(registry.len(), 1);
        let tool = registry.get("echo").unwrap();
        assert_eq!(tool.call(&serde_json::json!({"x": 1})).await.unwrap(), "{\"x\":1}");
    }
}
