//! Tool execution types
//!
//! Core types for tool execution results and the `Tool` seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::errors::{LexiError, Result};
use crate::llm::ToolDefinition;

/// Result of tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool name that was executed
    pub tool: String,

    /// Output handed back to the model
    pub output: String,

    /// Whether execution was successful
    pub success: bool,

    /// Execution duration in milliseconds
    pub duration_ms: u64,

    /// Optional error message if failed
    pub error: Option<String>,
}

impl ToolResult {
    /// Create successful result
    pub fn success(tool: String, output: String, duration: Duration) -> Self {
        Self {
            tool,
            output,
            success: true,
            duration_ms: duration.as_millis() as u64,
            error: None,
        }
    }

    /// Create failed result
    pub fn failure(tool: String, error: String, duration: Duration) -> Self {
        Self {
            tool,
            output: String::new(),
            success: false,
            duration_ms: duration.as_millis() as u64,
            error: Some(error),
        }
    }

    /// Text to place in the tool message; failures are reported to the model
    /// so it can recover
    pub fn message_content(&self) -> String {
        match &self.error {
            Some(error) if !self.success => format!("Error: {}", error),
            _ => self.output.clone(),
        }
    }
}

/// A function the agents can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls the tool by
    fn name(&self) -> &str;

    /// OpenAI function schema
    fn definition(&self) -> ToolDefinition;

    /// Run with decoded JSON arguments
    async fn call(&self, args: Value) -> Result<String>;
}

/// Fetch a required string argument
pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| LexiError::Generic(format!("Missing required argument: {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success(
            "laws_db_lookup".to_string(),
            "[]".to_string(),
            Duration::from_millis(100),
        );
        assert!(result.success);
        assert_eq!(result.duration_ms, 100);
        assert_eq!(result.message_content(), "[]");
    }

    #[test]
    fn test_tool_result_failure() {
        let result = ToolResult::failure(
            "laws_db_lookup".to_string(),
            "index unreachable".to_string(),
            Duration::from_millis(50),
        );
        assert!(!result.success);
        assert_eq!(result.message_content(), "Error: index unreachable");
    }

    #[test]
    fn test_required_str() {
        let args = json!({"query": "bail", "n": 3});
        assert_eq!(required_str(&args, "query").unwrap(), "bail");
        assert!(required_str(&args, "n").is_err());
        assert!(required_str(&args, "missing").is_err());
    }
}
