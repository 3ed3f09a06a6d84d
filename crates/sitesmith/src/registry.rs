use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall, ToolOutput};
use crate::systems::System;

/// Static mapping from tool name to the system that handles it.
///
/// Built once at startup; the set of tools never changes afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    systems: Vec<Box<dyn System>>,
    index: HashMap<String, usize>,
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a system and index all of its tools. Tool names must be unique
    /// across every registered system and within the system itself.
    pub fn register(&mut self, system: Box<dyn System>) -> AgentResult<()> {
        let position = self.systems.len();
        let mut incoming = HashSet::new();
        for tool in system.tools() {
            if self.index.contains_key(&tool.name) || !incoming.insert(tool.name.as_str()) {
                return Err(AgentError::DuplicateTool(tool.name.clone()));
            }
        }
        for tool in system.tools() {
            self.index.insert(tool.name.clone(), position);
            self.tools.push(tool.clone());
        }
        debug!(system = system.name(), tools = system.tools().len(), "registered system");
        self.systems.push(system);
        Ok(())
    }

    /// Every tool spec, in registration order
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn systems(&self) -> impl Iterator<Item = &dyn System> {
        self.systems.iter().map(|s| s.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Run the handler for `tool_call`. An unknown name is an error for the
    /// caller to act on; handler failures come back as [`ToolOutput::Error`].
    pub async fn dispatch(&self, tool_call: ToolCall) -> AgentResult<ToolOutput> {
        let position = *self
            .index
            .get(&tool_call.name)
            .ok_or_else(|| AgentError::ToolNotFound(tool_call.name.clone()))?;
        let system = &self.systems[position];

        info!(tool = %tool_call.name, system = system.name(), "dispatching tool call");
        let output = system.call(tool_call).await;
        debug!(is_error = output.is_error(), "tool call finished");
        Ok(output)
    }
}
