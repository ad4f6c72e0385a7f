//! Tool trait: the abstraction over retrieval and plotting providers.
//!
//! Tools are the orchestrator's only way to act: search the curated
//! corpus, fetch external literature, query the knowledge graph, or draw
//! a plot. Each provider implements the same invoke contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::citation::Citation;
use crate::error::ToolError;
use crate::reasoner::ToolDefinition;
use crate::schema::ToolSpec;

/// A request from the reasoner to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the reasoner's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as sent by the reasoner; validated before invocation
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Classification of a failed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Malformed arguments; the provider was never invoked
    ValidationError,
    /// Provider exceeded the per-tool timeout
    ToolTimeout,
    /// Provider not configured or unreachable
    ToolUnavailable,
    /// Provider raised while serving the call
    ProviderError,
}

impl ToolErrorKind {
    /// Status string of the error result wire contract.
    pub fn wire_status(&self) -> &'static str {
        match self {
            Self::ValidationError => "invalid_arguments",
            Self::ToolTimeout => "timeout",
            Self::ToolUnavailable | Self::ProviderError => "unavailable",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::ToolTimeout => "timeout",
            Self::ToolUnavailable => "unavailable",
            Self::ProviderError => "provider_error",
        }
    }
}

impl From<&ToolError> for ToolErrorKind {
    fn from(err: &ToolError) -> Self {
        match err {
            ToolError::Unavailable { .. } => Self::ToolUnavailable,
            ToolError::Provider { .. } => Self::ProviderError,
            ToolError::InvalidArguments(_) => Self::ValidationError,
            ToolError::Timeout { .. } => Self::ToolTimeout,
        }
    }
}

/// What a tool call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success {
        payload: Value,
        #[serde(default)]
        citations: Vec<Citation>,
    },
    Error {
        kind: ToolErrorKind,
        message: String,
    },
}

/// The result of one tool call, answering the call with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// The tool that was called
    pub tool_name: String,

    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: ToolOutput) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: ToolOutcome::Success {
                payload: output.payload,
                citations: output.citations,
            },
        }
    }

    pub fn error(call: &ToolCall, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: ToolOutcome::Error {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match &self.outcome {
            ToolOutcome::Error { kind, .. } => Some(*kind),
            ToolOutcome::Success { .. } => None,
        }
    }

    /// Citations carried by a successful result.
    pub fn citations(&self) -> &[Citation] {
        match &self.outcome {
            ToolOutcome::Success { citations, .. } => citations,
            ToolOutcome::Error { .. } => &[],
        }
    }

    /// Short outcome label used in status events.
    pub fn outcome_label(&self) -> &'static str {
        match &self.outcome {
            ToolOutcome::Success { .. } => "success",
            ToolOutcome::Error { kind, .. } => kind.as_str(),
        }
    }

    /// The JSON the reasoner observes: the payload on success, or
    /// `{error, status}` on failure.
    pub fn to_wire(&self) -> Value {
        match &self.outcome {
            ToolOutcome::Success { payload, .. } => payload.clone(),
            ToolOutcome::Error { kind, message } => serde_json::json!({
                "error": message,
                "status": kind.wire_status(),
            }),
        }
    }
}

/// Successful provider output: tool-specific payload plus the citations
/// the payload makes available for the final answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub payload: Value,
    pub citations: Vec<Citation>,
}

impl ToolOutput {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            citations: Vec::new(),
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }
}

/// Where a tool sits in the retrieval priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRole {
    /// Curated-corpus search, always tried first
    Primary,
    /// Open external literature, reserved for fallbacks and enrichment
    External,
    /// Structured grounding facts
    KnowledgeGraph,
    Plotting,
}

impl ToolRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::External => "external",
            Self::KnowledgeGraph => "knowledge_graph",
            Self::Plotting => "plotting",
        }
    }
}

/// The core Tool trait.
///
/// Each provider adapter (corpus search, external literature, knowledge
/// graph, plotting) implements this trait and is registered in the
/// [`ToolRegistry`]. Arguments arrive already validated against
/// [`Tool::spec`], with defaults filled in.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static description: name, description, parameter schema.
    fn spec(&self) -> &ToolSpec;

    /// Priority class of this tool.
    fn role(&self) -> ToolRole;

    /// Execute the tool with validated arguments.
    async fn invoke(&self, arguments: &Map<String, Value>) -> std::result::Result<ToolOutput, ToolError>;

    /// The unique name of this tool.
    fn name(&self) -> &str {
        &self.spec().name
    }

    /// Convert this tool into a ToolDefinition for sending to the reasoner.
    fn to_definition(&self) -> ToolDefinition {
        let spec = self.spec();
        ToolDefinition {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.to_json_schema(),
        }
    }
}

/// Read-only catalogue of available tools.
///
/// Populated at startup and then shared (behind an `Arc`) by every
/// session; nothing mutates it once built. Iteration is in name order so
/// the specs handed to the reasoner are stable across runs.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Role of a registered tool.
    pub fn role_of(&self, name: &str) -> Option<ToolRole> {
        self.tools.get(name).map(|t| t.role())
    }

    /// All tool specs.
    pub fn specs(&self) -> Vec<&ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    /// All tool definitions (for sending to the reasoner).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Names of the tools with a given role.
    pub fn names_with_role(&self, role: ToolRole) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|(_, t)| t.role() == role)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParamSpec;

    /// A simple test tool for unit tests.
    struct EchoTool {
        spec: ToolSpec,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                spec: ToolSpec::new("echo", "Echoes back the input")
                    .param(ParamSpec::string("text", "Text to echo").required()),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> &ToolSpec {
            &self.spec
        }
        fn role(&self) -> ToolRole {
            ToolRole::Primary
        }
        async fn invoke(&self, arguments: &Map<String, Value>) -> std::result::Result<ToolOutput, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolOutput::new(serde_json::json!({ "echo": text }))
                .with_citations(vec![Citation::new("Echo2024", "echo")]))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.role_of("echo"), Some(ToolRole::Primary));
        assert_eq!(registry.names_with_role(ToolRole::Primary), vec!["echo"]);
    }

    #[test]
    fn registry_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["required"], serde_json::json!(["text"]));
    }

    #[tokio::test]
    async fn invoke_tool_through_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));

        let tool = registry.get("echo").unwrap();
        let args = tool.spec().validate(&serde_json::json!({"text": "hello world"})).unwrap();
        let output = tool.invoke(&args).await.unwrap();
        assert_eq!(output.payload["echo"], "hello world");
        assert_eq!(output.citations[0].key, "Echo2024");
    }

    #[test]
    fn error_result_wire_shape() {
        let call = ToolCall::new("call_1", "query_papers", serde_json::json!({}));
        let result = ToolResult::error(&call, ToolErrorKind::ToolTimeout, "took too long");
        assert_eq!(
            result.to_wire(),
            serde_json::json!({"error": "took too long", "status": "timeout"})
        );
        assert_eq!(result.outcome_label(), "timeout");
        assert!(result.citations().is_empty());
    }

    #[test]
    fn provider_errors_report_unavailable_on_the_wire() {
        assert_eq!(ToolErrorKind::ProviderError.wire_status(), "unavailable");
        assert_eq!(ToolErrorKind::ValidationError.wire_status(), "invalid_arguments");
    }

    #[test]
    fn tool_error_maps_to_kind() {
        let err = ToolError::unavailable("kg", "no data dir");
        assert_eq!(ToolErrorKind::from(&err), ToolErrorKind::ToolUnavailable);
        let err = ToolError::InvalidArguments("bad".into());
        assert_eq!(ToolErrorKind::from(&err), ToolErrorKind::ValidationError);
    }
}
