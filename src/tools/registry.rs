//! Name → tool lookup and schema-checked dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::llm::ToolDefinition;
use crate::tools::schema::validate_args;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput};

/// Catalog of tools the agent may call.
///
/// The agent loop only ever sees names and JSON; adding a tool means
/// registering it here.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    /// Empty registry. Every dispatch is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Replaced previously registered tool");
        } else {
            tracing::debug!(tool = %name, "Registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions advertised to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Names of tools that want explicit user confirmation, sorted.
    pub fn confirmation_required(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .values()
            .filter(|t| t.requires_confirmation())
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Validate `params` against the tool's schema, then execute it under
    /// the registry timeout.
    pub async fn dispatch(
        &self,
        name: &str,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(format!("unknown tool '{}'", name)))?;

        validate_args(&tool.parameters_schema(), &params).map_err(ToolError::Validation)?;

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, tool.execute(params, ctx))
            .await
            .map_err(|_| ToolError::Timeout(self.timeout))?;

        match &result {
            Ok(_) => tracing::debug!(
                tool = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Tool succeeded"
            ),
            Err(e) => tracing::warn!(tool = %name, error = %e, "Tool failed"),
        }
        result
    }
}
