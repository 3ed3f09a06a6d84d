use async_trait::async_trait;

use crate::models::tool::{Tool, ToolCall, ToolOutput};

/// Core trait that defines a system that can be operated by an AI agent
#[async_trait]
pub trait System: Send + Sync {
    /// Get the name of the system
    fn name(&self) -> &str;

    /// Get the system description
    fn description(&self) -> &str;

    /// Get system instructions
    fn instructions(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Call one of this system's tools.
    ///
    /// Failures of the tool itself are reported through [`ToolOutput::Error`]
    /// so the model can react to them; a system never fails the agent loop.
    async fn call(&self, tool_call: ToolCall) -> ToolOutput;
}
