// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool executor registry
//!
//! Maps base tool names to async executors. Implementations (filesystem
//! adapters, search indexes) are injected by the embedder; the engine only
//! sees this seam.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{QuillError, Result};
use crate::llm::provider::ToolDefinition;

/// Async executor for one tool
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute the tool with normalized arguments. Failures propagate as
    /// errors and are captured into the call's result.
    async fn execute(&self, arguments: Value) -> Result<Value>;
}

type BoxedExecFn =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Executor built from a closure, mainly for tests and simple adapters
pub struct FnExecutor {
    func: BoxedExecFn,
}

impl FnExecutor {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |args| Box::pin(func(args))),
        }
    }
}

#[async_trait]
impl ToolExecutor for FnExecutor {
    async fn execute(&self, arguments: Value) -> Result<Value> {
        (self.func)(arguments).await
    }
}

/// Registry of executors keyed by base tool name
#[derive(Default)]
pub struct ToolRegistry {
    executors: HashMap<String, Arc<dyn ToolExecutor>>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under a base name
    pub fn register(&mut self, base_name: impl Into<String>, executor: Arc<dyn ToolExecutor>) {
        self.executors.insert(base_name.into(), executor);
    }

    /// Register an executor along with the definition advertised to the model
    pub fn register_with_definition(
        &mut self,
        base_name: impl Into<String>,
        executor: Arc<dyn ToolExecutor>,
        definition: ToolDefinition,
    ) {
        self.register(base_name, executor);
        self.definitions.push(definition);
    }

    /// Look up an executor by base name
    pub fn get(&self, base_name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.executors.get(base_name).cloned()
    }

    /// Look up an executor, erroring on unknown names
    pub fn require(&self, base_name: &str) -> Result<Arc<dyn ToolExecutor>> {
        self.get(base_name)
            .ok_or_else(|| QuillError::ToolExecution(format!("Unknown tool: {base_name}")))
    }

    /// Registered base names
    pub fn names(&self) -> Vec<&str> {
        self.executors.keys().map(String::as_str).collect()
    }

    /// Tool definitions for the model
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_executor() -> Arc<dyn ToolExecutor> {
        Arc::new(FnExecutor::new(|args| async move { Ok(args) }))
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register("read", echo_executor());

        let executor = registry.get("read").unwrap();
        let result = executor.execute(json!({ "path": "a.md" })).await.unwrap();
        assert_eq!(result["path"], "a.md");
    }

    #[test]
    fn test_require_unknown_tool() {
        let registry = ToolRegistry::new();
        // No Result::unwrap_err here: executors carry no Debug impl.
        let err = match registry.require("missing") {
            Ok(_) => panic!("lookup of an unregistered tool should fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("Unknown tool"));
    }

    #[test]
    fn test_names() {
        let mut registry = ToolRegistry::new();
        registry.register("read", echo_executor());
        registry.register("write", echo_executor());

        let mut names = registry.names();
        names.sort_unstable();
        assert_eq!(names, vec!["read", "write"]);
    }

    #[test]
    fn test_register_with_definition() {
        let mut registry = ToolRegistry::new();
        registry.register_with_definition(
            "read",
            echo_executor(),
            ToolDefinition {
                name: "mcp-filesystem_read".to_string(),
                description: "Read a file".to_string(),
                input_schema: json!({ "type": "object" }),
            },
        );

        assert_eq!(registry.definitions().len(), 1);
        assert_eq!(registry.definitions()[0].name, "mcp-filesystem_read");
        assert!(registry.get("read").is_some());
    }

    #[tokio::test]
    async fn test_executor_error_propagates() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "broken",
            Arc::new(FnExecutor::new(|_| async {
                Err(QuillError::ToolExecution("boom".to_string()))
            })) as Arc<dyn ToolExecutor>,
        );

        let executor = registry.get("broken").unwrap();
        let err = executor.execute(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
