//! Error types for the alzassist domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; only loop-level
//! conditions ([`OrchestratorError`]) ever reach the caller of a run.

use thiserror::Error;

/// The top-level error type for all alzassist operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Reasoner errors ---
    #[error("Reasoner error: {0}")]
    Reasoner(#[from] ReasonerError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Orchestration outcomes ---
    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the reasoning back-end that proposes the next step.
#[derive(Debug, Clone, Error)]
pub enum ReasonerError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by reasoner, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Reasoner not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid reasoner response: {0}")]
    InvalidResponse(String),
}

/// Failures raised by a tool provider while serving an invocation.
///
/// The dispatcher converts every variant into a `ToolOutcome::Error`,
/// so these never propagate past the dispatch boundary.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool unavailable: {tool_name}: {reason}")]
    Unavailable { tool_name: String, reason: String },

    #[error("Provider error in {tool_name}: {reason}")]
    Provider { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },
}

impl ToolError {
    pub fn unavailable(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }

    pub fn provider(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provider {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }
}

/// Violations of the session lifecycle or the message-ordering rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session already terminated with status '{0}'")]
    AlreadyTerminated(String),

    #[error("Iteration budget of {0} exhausted")]
    IterationBudgetExhausted(u32),

    #[error("Tool message at position {position} answers unknown call '{call_id}'")]
    OrphanToolMessage { position: usize, call_id: String },

    #[error("Tool call '{call_id}' was not answered before position {position}")]
    UnansweredToolCall { position: usize, call_id: String },

    #[error("Tool call '{call_id}' answered more than once")]
    DuplicateToolAnswer { call_id: String },

    #[error("Message at position {position} has role '{role}' but carries tool calls")]
    MisplacedToolCalls { position: usize, role: String },
}

/// Terminal outcomes of an orchestration run.
///
/// Tool-level failures stay inside the loop as data; only these
/// conditions end a session unsuccessfully.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("Query must not be empty")]
    InvalidQuery,

    #[error("Prior history is not causally ordered: {0}")]
    InvalidHistory(#[from] SessionError),

    #[error("No final answer after {iterations} iterations")]
    MaxIterationsExceeded { iterations: u32 },

    #[error("Citation integrity violated: unverifiable keys {unmatched:?}")]
    CitationIntegrity { unmatched: Vec<String> },

    #[error("Required tool '{tool_name}' failed fatally: {reason}")]
    FatalToolFailure { tool_name: String, reason: String },

    #[error("Session cancelled")]
    Cancelled,

    #[error("Reasoner failed: {0}")]
    Reasoner(#[source] ReasonerError),
}

impl OrchestratorError {
    /// Stable classification string for callers and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidQuery => "invalid_query",
            Self::InvalidHistory(_) => "invalid_history",
            Self::MaxIterationsExceeded { .. } => "max_iterations_exceeded",
            Self::CitationIntegrity { .. } => "citation_integrity_error",
            Self::FatalToolFailure { .. } => "fatal_tool_failure",
            Self::Cancelled => "cancelled",
            Self::Reasoner(_) => "reasoner_error",
        }
    }
}
