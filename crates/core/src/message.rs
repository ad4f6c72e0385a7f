//! Message and session-identity domain types.
//!
//! These are the value objects that flow through the loop:
//! user query → reasoner proposes an assistant message → tools answer
//! with tool messages → reasoner finalizes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::{ToolCall, ToolResult};

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The reasoner
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Message body: free text, or a structured tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
    ToolResult { result: ToolResult },
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::ToolResult { .. } => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        match self {
            Self::ToolResult { result } => Some(result),
            Self::Text { .. } => None,
        }
    }

    /// Text form handed to a reasoner: the text itself, or the tool
    /// result's wire JSON.
    pub fn render(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::ToolResult { result } => result.to_wire().to_string(),
        }
    }
}

/// A single message in a session history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    pub content: Content,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// If this is a tool result, which tool call it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Citation keys the assistant explicitly claims for its answer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claimed_citations: Vec<String>,

    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(role: Role, content: Content) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            claimed_citations: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::build(Role::User, Content::Text { text: text.into() })
    }

    /// Create a new assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::build(Role::Assistant, Content::Text { text: text.into() })
    }

    /// Create an assistant message requesting tool calls.
    pub fn assistant_with_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::assistant(text);
        msg.tool_calls = calls;
        msg
    }

    /// Create a tool message answering `result.call_id`.
    pub fn tool_result(result: ToolResult) -> Self {
        let call_id = result.call_id.clone();
        let mut msg = Self::build(Role::Tool, Content::ToolResult { result });
        msg.tool_call_id = Some(call_id);
        msg
    }

    /// Attach explicitly claimed citation keys.
    pub fn with_claimed_citations<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.claimed_citations = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Text content, empty for tool results.
    pub fn text(&self) -> &str {
        self.content.as_text().unwrap_or("")
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
