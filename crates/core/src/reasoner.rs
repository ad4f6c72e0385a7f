//! Reasoner trait: the abstraction over whatever decides the next step.
//!
//! Given the session history and the tools currently visible, a reasoner
//! proposes the next assistant message: either tool calls to execute or
//! a final answer. The orchestrator never knows which back-end is in use.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ReasonerError;
use crate::message::Message;

/// A tool definition sent to the reasoner so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The core Reasoner trait.
///
/// Implementations: an OpenAI-compatible chat-completions client, and
/// scripted stubs in tests.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// A human-readable name for this back-end (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Propose the next assistant message.
    ///
    /// The returned message must have role `Assistant`. If it carries tool
    /// calls the orchestrator dispatches them; otherwise it is treated as
    /// the final answer.
    async fn propose_next_step(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> std::result::Result<Message, ReasonerError>;

    /// Health check: can we reach the back-end?
    async fn health_check(&self) -> std::result::Result<bool, ReasonerError> {
        Ok(true)
    }
}
