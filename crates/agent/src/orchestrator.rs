//! The orchestration loop.
//!
//! One run answers one query:
//!
//! 1. **Seed** the session with prior history and the user query
//! 2. **Reason**: ask the reasoner for the next step, offering the tools
//!    visible under the routing policy
//! 3. **Finalize** if the reply requests no tools: validate its citations
//!    against the session pool and return the answer
//! 4. **Act** otherwise: dispatch the requested calls concurrently,
//!    append the assistant turn and one tool message per result, and go
//!    back to step 2
//!
//! The loop stops after `max_iterations` cycles. Tool failures are data
//! for the reasoner; only iteration exhaustion, citation integrity, a
//! fatal primary-tool loss, reasoner failure, and cancellation end a run
//! unsuccessfully.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alzassist_config::AppConfig;
use alzassist_core::citation::Citation;
use alzassist_core::error::OrchestratorError;
use alzassist_core::event::{EventBus, StatusEvent, StatusKind};
use alzassist_core::message::{Message, Role};
use alzassist_core::reasoner::Reasoner;
use alzassist_core::session::{Session, SessionStatus, validate_history};
use alzassist_core::tool::{ToolErrorKind, ToolRegistry, ToolResult, ToolRole};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::citation_validator;
use crate::dispatcher::Dispatcher;
use crate::routing::{self, RoutingDecision, RoutingPolicy};

/// Per-session orchestration settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_iterations: u32,
    pub per_tool_timeout: Duration,
    /// Tool subset enabled for the session; `None` enables every tool
    pub enabled_tools: Option<Vec<String>>,
    pub routing: RoutingPolicy,
    /// Treat an unavailable primary tool as a terminal failure
    pub fatal_on_primary_unavailable: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            per_tool_timeout: Duration::from_secs(120),
            enabled_tools: None,
            routing: RoutingPolicy::Advisory,
            fatal_on_primary_unavailable: true,
        }
    }
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        let settings = &config.orchestrator;
        Self {
            max_iterations: settings.max_iterations,
            per_tool_timeout: Duration::from_millis(settings.per_tool_timeout_ms),
            enabled_tools: settings.enabled_tools.clone(),
            routing: settings.routing.into(),
            fatal_on_primary_unavailable: settings.fatal_on_primary_unavailable,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_per_tool_timeout(mut self, timeout: Duration) -> Self {
        self.per_tool_timeout = timeout;
        self
    }

    pub fn with_enabled_tools(mut self, tools: Option<Vec<String>>) -> Self {
        self.enabled_tools = tools;
        self
    }

    pub fn with_routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }
}

/// Synthesized answer plus the citations it references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalAnswer {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl FinalAnswer {
    pub fn citation_keys(&self) -> Vec<&str> {
        self.citations.iter().map(|c| c.key.as_str()).collect()
    }
}

/// A successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub session_id: String,
    pub status: SessionStatus,
    pub answer: FinalAnswer,
    pub iterations: u32,
    pub history: Vec<Message>,
    pub events: Vec<StatusEvent>,
}

/// A run that ended in a terminal failure. Carries the partial history
/// and the status-event trail; never an answer.
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub session_id: String,
    pub status: SessionStatus,
    pub error: OrchestratorError,
    pub iterations: u32,
    pub history: Vec<Message>,
    pub events: Vec<StatusEvent>,
}

impl RunFailure {
    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.error, self.error.kind())
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Drives the reason-act-observe loop against a shared tool registry.
pub struct Orchestrator {
    reasoner: Arc<dyn Reasoner>,
    dispatcher: Dispatcher,
    config: OrchestratorConfig,
    event_bus: Arc<EventBus>,
}

impl Orchestrator {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        registry: Arc<ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(registry, config.per_tool_timeout)
            .with_enabled_tools(config.enabled_tools.clone());
        Self {
            reasoner,
            dispatcher,
            config,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Publish status events on a shared bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Answer `query`, optionally continuing `prior` history.
    pub async fn run(&self, query: &str, prior: Vec<Message>) -> Result<RunReport, RunFailure> {
        self.run_with_cancel(query, prior, CancellationToken::new()).await
    }

    /// [`run`](Self::run) that stops as soon as `cancel` fires. In-flight
    /// tool calls are abandoned and the session ends `Cancelled`.
    pub async fn run_with_cancel(
        &self,
        query: &str,
        prior: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<RunReport, RunFailure> {
        let max_iterations = self.config.max_iterations;

        if query.trim().is_empty() {
            let run = RunState::new(Session::new(max_iterations), &self.event_bus);
            return Err(run.fail(OrchestratorError::InvalidQuery));
        }
        if let Err(e) = validate_history(&prior) {
            let mut run = RunState::new(Session::new(max_iterations), &self.event_bus);
            run.prior = prior;
            return Err(run.fail(e.into()));
        }

        let session = match Session::with_history(max_iterations, prior) {
            Ok(session) => session,
            Err(e) => {
                let run = RunState::new(Session::new(max_iterations), &self.event_bus);
                return Err(run.fail(e.into()));
            }
        };
        let mut run = RunState::new(session, &self.event_bus);
        if let Err(e) = run.session.push(Message::user(query)) {
            return Err(run.fail(e.into()));
        }

        let registry = self.dispatcher.registry();
        let mut primary_attempted = routing::primary_attempted(run.session.messages(), registry);

        info!(
            session_id = %run.session.id(),
            max_iterations,
            prior_messages = run.session.messages().len() - 1,
            "Starting session"
        );

        loop {
            let iteration = match run.session.begin_iteration() {
                Ok(iteration) => iteration,
                Err(_) => {
                    warn!(session_id = %run.session.id(), max_iterations, "Iteration budget exhausted");
                    return Err(run.fail(OrchestratorError::MaxIterationsExceeded {
                        iterations: max_iterations,
                    }));
                }
            };
            debug!(session_id = %run.session.id(), iteration, "Orchestrator iteration");

            // ── Reason ──
            let tools = self
                .dispatcher
                .visible_definitions(self.config.routing, primary_attempted);
            run.emit(StatusKind::ReasonerInvoked);

            let proposal = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                proposal = self.reasoner.propose_next_step(run.session.messages(), &tools) => Some(proposal),
            };
            let mut message = match proposal {
                None => return Err(run.fail(OrchestratorError::Cancelled)),
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    warn!(session_id = %run.session.id(), error = %e, "Reasoner failed");
                    return Err(run.fail(OrchestratorError::Reasoner(e)));
                }
            };
            message.role = Role::Assistant;
            message.tool_call_id = None;

            // ── Finalize ──
            if !message.has_tool_calls() {
                let citations = match citation_validator::validate(
                    message.text(),
                    &message.claimed_citations,
                    run.session.citations(),
                ) {
                    Ok(citations) => citations,
                    Err(e) => {
                        warn!(session_id = %run.session.id(), error = %e, "Final answer rejected");
                        return Err(run.fail(e));
                    }
                };
                let answer = FinalAnswer {
                    text: message.text().to_string(),
                    citations,
                };
                if let Err(e) = run.session.push(message) {
                    return Err(run.fail(e.into()));
                }
                return Ok(run.finish(answer));
            }

            // ── Act ──
            normalize_call_ids(&mut message, iteration);
            let calls = message.tool_calls.clone();

            let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
            let mut to_dispatch = Vec::new();
            let mut attempted = primary_attempted;
            for (i, call) in calls.iter().enumerate() {
                let role = registry.role_of(&call.name);
                match self.config.routing.evaluate(role, attempted) {
                    RoutingDecision::Allow => to_dispatch.push((i, call.clone())),
                    RoutingDecision::Advise(reason) => {
                        info!(tool = %call.name, %reason, "Routing advisory");
                        run.emit(StatusKind::RoutingAdvisory {
                            tool: call.name.clone(),
                            reason,
                        });
                        to_dispatch.push((i, call.clone()));
                    }
                    RoutingDecision::Reject(reason) => {
                        slots[i] = Some(ToolResult::error(call, ToolErrorKind::ValidationError, reason));
                    }
                }
                if role == Some(ToolRole::Primary) {
                    attempted = true;
                }
            }

            for call in &calls {
                run.emit(StatusKind::ToolStarted {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                });
            }

            let batch: Vec<_> = to_dispatch.iter().map(|(_, call)| call.clone()).collect();
            let dispatched = match self.dispatcher.execute_cancellable(&batch, &cancel).await {
                Ok(dispatched) => dispatched,
                Err(_) => return Err(run.fail(OrchestratorError::Cancelled)),
            };

            let mut durations = vec![0u64; calls.len()];
            for ((i, _), d) in to_dispatch.iter().zip(dispatched) {
                durations[*i] = d.duration_ms;
                slots[*i] = Some(d.result);
            }
            let results: Vec<ToolResult> = slots.into_iter().flatten().collect();

            // The assistant turn and its answers are committed together.
            if let Err(e) = run.session.push(message) {
                return Err(run.fail(e.into()));
            }
            for (result, duration_ms) in results.iter().zip(durations) {
                run.emit(StatusKind::ToolFinished {
                    call_id: result.call_id.clone(),
                    tool: result.tool_name.clone(),
                    outcome: result.outcome_label().to_string(),
                    duration_ms,
                });
                if let Err(e) = run.session.push(Message::tool_result(result.clone())) {
                    return Err(run.fail(e.into()));
                }
            }
            primary_attempted = attempted;

            if self.config.fatal_on_primary_unavailable {
                let fatal = results.iter().find(|r| {
                    r.error_kind() == Some(ToolErrorKind::ToolUnavailable)
                        && registry.role_of(&r.tool_name) == Some(ToolRole::Primary)
                        && self.dispatcher.is_enabled(&r.tool_name)
                });
                if let Some(result) = fatal {
                    let reason = result.to_wire()["error"].as_str().unwrap_or_default().to_string();
                    warn!(tool = %result.tool_name, %reason, "Primary tool unavailable");
                    return Err(run.fail(OrchestratorError::FatalToolFailure {
                        tool_name: result.tool_name.clone(),
                        reason,
                    }));
                }
            }
        }
    }
}

/// Give every call in the turn a non-empty id unique within the turn.
fn normalize_call_ids(message: &mut Message, iteration: u32) {
    let mut seen = HashSet::new();
    for (i, call) in message.tool_calls.iter_mut().enumerate() {
        if call.id.is_empty() || !seen.insert(call.id.clone()) {
            call.id = format!("call_{iteration}_{i}");
            seen.insert(call.id.clone());
        }
    }
}

/// Mutable state of one run: the session and its event trail.
struct RunState<'a> {
    session: Session,
    events: Vec<StatusEvent>,
    bus: &'a EventBus,
    /// History handed back when the prior history itself was rejected
    prior: Vec<Message>,
}

impl<'a> RunState<'a> {
    fn new(session: Session, bus: &'a EventBus) -> Self {
        Self {
            session,
            events: Vec::new(),
            bus,
            prior: Vec::new(),
        }
    }

    fn emit(&mut self, kind: StatusKind) {
        let event = StatusEvent::new(
            self.events.len() as u64,
            self.session.id().to_string(),
            self.session.iteration(),
            kind,
        );
        self.bus.publish(event.clone());
        self.events.push(event);
    }

    fn terminate(&mut self, status: SessionStatus) {
        // Only the first terminal transition counts.
        if self.session.terminate(status).is_ok() {
            self.emit(StatusKind::Terminated { status });
        }
    }

    fn finish(mut self, answer: FinalAnswer) -> RunReport {
        self.emit(StatusKind::Finalized {
            citations: answer.citation_keys().into_iter().map(String::from).collect(),
        });
        self.terminate(SessionStatus::Done);

        info!(
            session_id = %self.session.id(),
            iterations = self.session.iteration(),
            citations = answer.citations.len(),
            "Session finished"
        );

        RunReport {
            session_id: self.session.id().to_string(),
            status: self.session.status(),
            iterations: self.session.iteration(),
            answer,
            events: self.events,
            history: self.session.into_messages(),
        }
    }

    fn fail(mut self, error: OrchestratorError) -> RunFailure {
        let status = match error {
            OrchestratorError::MaxIterationsExceeded { .. } => SessionStatus::MaxIterations,
            OrchestratorError::Cancelled => SessionStatus::Cancelled,
            _ => SessionStatus::Error,
        };
        self.terminate(status);

        info!(
            session_id = %self.session.id(),
            status = %status,
            kind = error.kind(),
            "Session terminated"
        );

        let session_id = self.session.id().to_string();
        let iterations = self.session.iteration();
        let history = if self.prior.is_empty() {
            self.session.into_messages()
        } else {
            self.prior
        };
        RunFailure {
            session_id,
            status,
            error,
            iterations,
            history,
            events: self.events,
        }
    }
}
