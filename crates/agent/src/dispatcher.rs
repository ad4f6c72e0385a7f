//! Tool dispatcher: validated, concurrent, time-bounded tool execution.
//!
//! All calls of one turn run concurrently; each is bounded by the
//! per-tool timeout. Every failure mode (unknown tool, disabled tool,
//! bad arguments, provider error, timeout, panic) becomes a
//! [`ToolResult`] error, so nothing raised by a provider crosses this
//! boundary. Results come back in request order regardless of which
//! call finishes first.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use alzassist_core::reasoner::ToolDefinition;
use alzassist_core::tool::{ToolCall, ToolErrorKind, ToolRegistry, ToolResult, ToolRole};
use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::routing::RoutingPolicy;

/// Whether a tool is offered to the reasoner right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolAvailability {
    pub name: String,
    pub role: ToolRole,
    pub visible: bool,
}

/// One executed call with its wall-clock duration.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub result: ToolResult,
    pub duration_ms: u64,
}

/// The turn was cancelled while calls were in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchCancelled;

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    enabled: Option<HashSet<String>>,
    per_tool_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, per_tool_timeout: Duration) -> Self {
        Self {
            registry,
            enabled: None,
            per_tool_timeout,
        }
    }

    /// Restrict the session to a subset of the registry. `None` enables all.
    pub fn with_enabled_tools(mut self, enabled: Option<Vec<String>>) -> Self {
        self.enabled = enabled.map(|names| names.into_iter().collect());
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.registry.contains(name) && self.enabled.as_ref().is_none_or(|e| e.contains(name))
    }

    /// Availability of every enabled tool under `policy`.
    pub fn availability(&self, policy: RoutingPolicy, primary_attempted: bool) -> Vec<ToolAvailability> {
        self.registry
            .names()
            .into_iter()
            .filter(|name| self.is_enabled(name))
            .filter_map(|name| {
                let role = self.registry.role_of(name)?;
                Some(ToolAvailability {
                    name: name.to_string(),
                    role,
                    visible: policy.is_visible(role, primary_attempted),
                })
            })
            .collect()
    }

    /// Definitions of the tools currently visible to the reasoner.
    pub fn visible_definitions(
        &self,
        policy: RoutingPolicy,
        primary_attempted: bool,
    ) -> Vec<ToolDefinition> {
        self.availability(policy, primary_attempted)
            .into_iter()
            .filter(|a| a.visible)
            .filter_map(|a| self.registry.get(&a.name))
            .map(|tool| tool.to_definition())
            .collect()
    }

    /// Execute a turn's calls and return one result per call, in order.
    pub async fn execute(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.execute_one(call)))
            .await
            .into_iter()
            .map(|d| d.result)
            .collect()
    }

    /// Like [`execute`](Self::execute), but abandons every in-flight call
    /// as soon as `cancel` fires.
    pub async fn execute_cancellable(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Result<Vec<Dispatched>, DispatchCancelled> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchCancelled),
            dispatched = join_all(calls.iter().map(|call| self.execute_one(call))) => Ok(dispatched),
        }
    }

    async fn execute_one(&self, call: &ToolCall) -> Dispatched {
        let start = Instant::now();
        let result = self.invoke(call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            tool = %call.name,
            call_id = %call.id,
            outcome = result.outcome_label(),
            duration_ms,
            "Tool call finished"
        );
        Dispatched { result, duration_ms }
    }

    async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name) else {
            return ToolResult::error(
                call,
                ToolErrorKind::ValidationError,
                format!("Unknown tool '{}'", call.name),
            );
        };
        if !self.is_enabled(&call.name) {
            return ToolResult::error(
                call,
                ToolErrorKind::ToolUnavailable,
                format!("Tool '{}' is not enabled for this session", call.name),
            );
        }

        let arguments = match tool.spec().validate(&call.arguments) {
            Ok(arguments) => arguments,
            Err(failure) => {
                debug!(tool = %call.name, error = %failure, "Rejected tool arguments");
                return ToolResult::error(call, ToolErrorKind::ValidationError, failure.to_string());
            }
        };

        let invocation = AssertUnwindSafe(tool.invoke(&arguments)).catch_unwind();
        match tokio::time::timeout(self.per_tool_timeout, invocation).await {
            Ok(Ok(Ok(output))) => ToolResult::success(call, output),
            Ok(Ok(Err(e))) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolResult::error(call, ToolErrorKind::from(&e), e.to_string())
            }
            Ok(Err(_panic)) => {
                warn!(tool = %call.name, "Tool provider panicked");
                ToolResult::error(
                    call,
                    ToolErrorKind::ProviderError,
                    format!("Tool '{}' failed unexpectedly", call.name),
                )
            }
            Err(_elapsed) => {
                let timeout_ms = self.per_tool_timeout.as_millis() as u64;
                warn!(tool = %call.name, call_id = %call.id, timeout_ms, "Tool call timed out");
                ToolResult::error(
                    call,
                    ToolErrorKind::ToolTimeout,
                    format!("Tool '{}' did not respond within {timeout_ms}ms", call.name),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{StubTool, registry_of};
    use alzassist_core::citation::Citation;
    use alzassist_core::error::ToolError;
    use serde_json::json;

    fn dispatcher(tools: Vec<StubTool>) -> Dispatcher {
        Dispatcher::new(Arc::new(registry_of(tools)), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn successful_call_carries_citations() {
        let d = dispatcher(vec![StubTool::corpus(vec![Citation::new("Reiman2020", "query_papers")])]);
        let results = d
            .execute(&[ToolCall::new("c1", "query_papers", json!({"query": "APOE4"}))])
            .await;
        assert!(results[0].is_success());
        assert_eq!(results[0].citations()[0].key, "Reiman2020");
    }

    #[tokio::test]
    async fn malformed_arguments_never_reach_provider() {
        let tool = StubTool::corpus(vec![]);
        let invocations = tool.invocations();
        let d = dispatcher(vec![tool]);
        let results = d
            .execute(&[ToolCall::new("c1", "query_papers", json!({"q": "APOE4"}))])
            .await;
        assert_eq!(results[0].error_kind(), Some(ToolErrorKind::ValidationError));
        assert_eq!(invocations.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_and_disabled_tools() {
        let d = dispatcher(vec![StubTool::corpus(vec![]), StubTool::external(vec![])])
            .with_enabled_tools(Some(vec!["query_papers".into()]));
        let results = d
            .execute(&[
                ToolCall::new("c1", "no_such_tool", json!({})),
                ToolCall::new("c2", "search_external_literature", json!({"query": "tau"})),
            ])
            .await;
        assert_eq!(results[0].error_kind(), Some(ToolErrorKind::ValidationError));
        assert_eq!(results[1].error_kind(), Some(ToolErrorKind::ToolUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_isolated_to_one_call() {
        let d = dispatcher(vec![
            StubTool::corpus(vec![Citation::new("Reiman2020", "query_papers")]),
            StubTool::external(vec![]).with_delay(Duration::from_secs(5)),
        ]);
        let results = d
            .execute(&[
                ToolCall::new("slow", "search_external_literature", json!({"query": "tau"})),
                ToolCall::new("fast", "query_papers", json!({"query": "tau"})),
            ])
            .await;
        assert_eq!(results[0].call_id, "slow");
        assert_eq!(results[0].error_kind(), Some(ToolErrorKind::ToolTimeout));
        assert_eq!(results[1].call_id, "fast");
        assert!(results[1].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn results_keep_request_order() {
        let d = dispatcher(vec![
            StubTool::corpus(vec![]).with_delay(Duration::from_millis(300)),
            StubTool::external(vec![]).with_delay(Duration::from_millis(10)),
        ]);
        let results = d
            .execute(&[
                ToolCall::new("a", "query_papers", json!({"query": "q"})),
                ToolCall::new("b", "search_external_literature", json!({"query": "q"})),
            ])
            .await;
        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_run_concurrently() {
        let d = dispatcher(vec![
            StubTool::corpus(vec![]).with_delay(Duration::from_millis(200)),
            StubTool::external(vec![]).with_delay(Duration::from_millis(200)),
        ]);
        let start = Instant::now();
        d.execute(&[
            ToolCall::new("a", "query_papers", json!({"query": "q"})),
            ToolCall::new("b", "search_external_literature", json!({"query": "q"})),
        ])
        .await;
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn provider_errors_and_panics_become_results() {
        let d = dispatcher(vec![
            StubTool::corpus(vec![]).failing(ToolError::unavailable("query_papers", "down")),
            StubTool::external(vec![]).panicking(),
        ]);
        let results = d
            .execute(&[
                ToolCall::new("a", "query_papers", json!({"query": "q"})),
                ToolCall::new("b", "search_external_literature", json!({"query": "q"})),
            ])
            .await;
        assert_eq!(results[0].error_kind(), Some(ToolErrorKind::ToolUnavailable));
        assert_eq!(results[1].error_kind(), Some(ToolErrorKind::ProviderError));
        assert_eq!(results[1].to_wire()["status"], "unavailable");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_in_flight_calls() {
        let d = dispatcher(vec![StubTool::corpus(vec![]).with_delay(Duration::from_secs(60))]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let outcome = d
            .execute_cancellable(&[ToolCall::new("a", "query_papers", json!({"query": "q"}))], &cancel)
            .await;
        assert_eq!(outcome.err(), Some(DispatchCancelled));
    }

    #[test]
    fn gated_availability_hides_external() {
        let d = dispatcher(vec![StubTool::corpus(vec![]), StubTool::external(vec![])]);
        let availability = d.availability(RoutingPolicy::Gated, false);
        let external = availability
            .iter()
            .find(|a| a.name == "search_external_literature")
            .unwrap();
        assert!(!external.visible);
        assert_eq!(d.visible_definitions(RoutingPolicy::Gated, false).len(), 1);
        assert_eq!(d.visible_definitions(RoutingPolicy::Gated, true).len(), 2);
        assert_eq!(d.visible_definitions(RoutingPolicy::Advisory, false).len(), 2);
    }
}
