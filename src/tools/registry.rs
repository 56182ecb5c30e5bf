//! Tool registry
//!
//! Holds the callable tools by name and executes model tool calls against
//! them. Each agent works from a `subset` of the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::llm::{ToolCall, ToolDefinition};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::tools::types::{Tool, ToolResult};

/// Tool registry
#[derive(Clone, Default)]
pub struct ToolRegistry {
    /// Map of tool name to implementation
    tools: HashMap<String, Arc<dyn Tool>>,
    telemetry: Option<TelemetryCollector>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Register a tool under its own name, replacing any previous one
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Check if tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Function schemas, in name order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Registry restricted to `names`; unknown names are skipped
    pub fn subset(&self, names: &[&str]) -> Self {
        let tools = names
            .iter()
            .filter_map(|name| self.tools.get(*name).map(|t| (name.to_string(), t.clone())))
            .collect();

        Self {
            tools,
            telemetry: self.telemetry.clone(),
        }
    }

    /// Run one model tool call. Never fails: errors come back as a failed
    /// `ToolResult` for the model to read.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let name = call.function.name.clone();
        let start = Instant::now();
        self.record(TelemetryEvent::ToolStarted {
            tool: name.clone(),
            timestamp: start,
        });

        let outcome = match self.tools.get(&name) {
            None => Err(format!("Unknown tool: {}", name)),
            Some(tool) => match call.parsed_arguments() {
                Err(e) => Err(format!("Invalid arguments: {}", e)),
                Ok(args) => tool.call(args).await.map_err(|e| e.to_string()),
            },
        };

        let duration = start.elapsed();
        let result = match outcome {
            Ok(output) => ToolResult::success(name.clone(), output, duration),
            Err(error) => {
                tracing::warn!(tool = %name, %error, "tool call failed");
                ToolResult::failure(name.clone(), error, duration)
            }
        };

        self.record(TelemetryEvent::ToolCompleted {
            tool: name,
            duration_ms: result.duration_ms,
            success: result.success,
            timestamp: Instant::now(),
        });
        result
    }

    fn record(&self, event: TelemetryEvent) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(event);
        }
    }

    /// Get number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
