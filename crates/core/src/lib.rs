//! # AlzAssist Core
//!
//! Domain types, traits, and error definitions for the AlzAssist research
//! assistant. This crate has **no I/O dependencies**: it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The reasoner and every retrieval provider are defined as traits here.
//! Implementations live in their respective crates, so the orchestrator
//! can be tested against scripted reasoners and stub tools.

pub mod citation;
pub mod error;
pub mod event;
pub mod message;
pub mod reasoner;
pub mod schema;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use citation::{Citation, CitationPool};
pub use error::{Error, OrchestratorError, ReasonerError, Result, SessionError, ToolError};
pub use event::{EventBus, StatusEvent, StatusKind};
pub use message::{Content, Message, Role, SessionId};
pub use reasoner::{Reasoner, ToolDefinition};
pub use schema::{ParamSpec, ParamType, ToolSpec, ValidationFailure};
pub use session::{Session, SessionStatus, validate_history};
pub use tool::{
    Tool, ToolCall, ToolErrorKind, ToolOutcome, ToolOutput, ToolRegistry, ToolResult, ToolRole,
};
