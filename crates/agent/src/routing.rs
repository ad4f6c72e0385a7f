//! Primary-tool-first routing.
//!
//! The curated corpus is consulted before external literature for the
//! same question. Under [`RoutingPolicy::Advisory`] the rule is only
//! reported; under [`RoutingPolicy::Gated`] external tools stay hidden
//! and calls to them are rejected until a primary tool has been tried.

use alzassist_config::RoutingMode;
use alzassist_core::message::Message;
use alzassist_core::tool::{ToolRegistry, ToolRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    #[default]
    Advisory,
    Gated,
}

impl From<RoutingMode> for RoutingPolicy {
    fn from(mode: RoutingMode) -> Self {
        match mode {
            RoutingMode::Advisory => Self::Advisory,
            RoutingMode::Gated => Self::Gated,
        }
    }
}

/// What to do with one requested call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    Allow,
    /// Execute, but report the out-of-order use
    Advise(String),
    /// Do not execute; answer with a validation error
    Reject(String),
}

impl RoutingPolicy {
    /// Whether a tool with `role` is shown to the reasoner.
    pub fn is_visible(&self, role: ToolRole, primary_attempted: bool) -> bool {
        match (self, role) {
            (Self::Gated, ToolRole::External) => primary_attempted,
            _ => true,
        }
    }

    /// Decide on a call to a tool with `role`. Unknown tools (`None`) are
    /// left to the dispatcher.
    pub fn evaluate(&self, role: Option<ToolRole>, primary_attempted: bool) -> RoutingDecision {
        if role != Some(ToolRole::External) || primary_attempted {
            return RoutingDecision::Allow;
        }
        match self {
            Self::Advisory => RoutingDecision::Advise(
                "external literature consulted before the curated corpus".into(),
            ),
            Self::Gated => RoutingDecision::Reject(
                "External literature is only available after the curated corpus has been \
                 searched; call the primary corpus tool first"
                    .into(),
            ),
        }
    }
}

/// Whether `history` already contains a call to a primary tool.
pub fn primary_attempted(history: &[Message], registry: &ToolRegistry) -> bool {
    history
        .iter()
        .flat_map(|m| m.tool_calls.iter())
        .any(|call| registry.role_of(&call.name) == Some(ToolRole::Primary))
}
