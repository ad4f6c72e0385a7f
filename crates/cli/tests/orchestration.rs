//! End-to-end orchestration tests.
//!
//! These drive the full session loop through the public APIs: a scripted
//! reasoner, stub providers behind the shared registry, dispatch, routing,
//! and citation validation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alzassist_agent::{CancellationToken, Orchestrator, OrchestratorConfig, RoutingPolicy};
use alzassist_core::citation::Citation;
use alzassist_core::error::{OrchestratorError, ReasonerError, ToolError};
use alzassist_core::event::StatusKind;
use alzassist_core::message::{Message, Role};
use alzassist_core::reasoner::{Reasoner, ToolDefinition};
use alzassist_core::schema::{ParamSpec, ToolSpec};
use alzassist_core::session::{SessionStatus, validate_history};
use alzassist_core::tool::{Tool, ToolCall, ToolErrorKind, ToolOutput, ToolRegistry, ToolRole};
use alzassist_tools::knowledge_graph::{EDGES_FILE, NODES_FILE};
use alzassist_tools::{GraphSource, KnowledgeGraphTool};
use serde_json::{Map, Value, json};

// ── Scripted reasoner ────────────────────────────────────────────────────

/// Replays a fixed script; repeats the last reply once the script runs out.
struct ScriptedReasoner {
    replies: Mutex<VecDeque<Message>>,
    last: Mutex<Option<Message>>,
    calls: AtomicUsize,
}

impl ScriptedReasoner {
    fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Reasoner for ScriptedReasoner {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn propose_next_step(
        &self,
        _history: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<Message, ReasonerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone()
            .ok_or_else(|| ReasonerError::InvalidResponse("empty script".into()))
    }
}

/// A reasoner that never answers.
struct StalledReasoner;

#[async_trait::async_trait]
impl Reasoner for StalledReasoner {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn propose_next_step(
        &self,
        _history: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<Message, ReasonerError> {
        std::future::pending().await
    }
}

// ── Stub providers ───────────────────────────────────────────────────────

struct StubProvider {
    spec: ToolSpec,
    role: ToolRole,
    citations: Vec<Citation>,
    delay: Option<Duration>,
    error: Option<ToolError>,
}

impl StubProvider {
    fn new(name: &str, role: ToolRole) -> Self {
        Self {
            spec: ToolSpec::new(name, format!("Stub {name}"))
                .param(ParamSpec::string("query", "Question").required()),
            role,
            citations: Vec::new(),
            delay: None,
            error: None,
        }
    }

    fn corpus() -> Self {
        Self::new("query_papers", ToolRole::Primary)
    }

    fn external() -> Self {
        Self::new("search_external_literature", ToolRole::External)
    }

    fn citing(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn broken(mut self, error: ToolError) -> Self {
        self.error = Some(error);
        self
    }
}

#[async_trait::async_trait]
impl Tool for StubProvider {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn role(&self) -> ToolRole {
        self.role
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        Ok(ToolOutput::new(json!({
            "answer": format!("findings for {}", arguments["query"]),
            "citations": self.citations,
        }))
        .with_citations(self.citations.clone()))
    }
}

fn reiman() -> Citation {
    Citation::new("Reiman2020", "query_papers")
        .with_text("Reiman EM et al. (2020) Exceptionally low likelihood of Alzheimer's dementia in APOE2 homozygotes.")
        .with_source_id("PMC7320145")
}

fn registry(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    Arc::new(registry)
}

fn call(id: &str, tool: &str, arguments: Value) -> Message {
    Message::assistant_with_calls("", vec![ToolCall::new(id, tool, arguments)])
}

fn search_corpus(id: &str) -> Message {
    call(id, "query_papers", json!({"query": "APOE4 risk"}))
}

fn tool_results(history: &[Message]) -> Vec<&alzassist_core::tool::ToolResult> {
    history
        .iter()
        .filter_map(|m| m.content.as_tool_result())
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_corpus_backed_answer() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        search_corpus("call_1"),
        Message::assistant("APOE4 is the strongest common genetic risk factor (Reiman2020)."),
    ]));
    let orch = Orchestrator::new(
        reasoner.clone(),
        registry(vec![Arc::new(StubProvider::corpus().citing(vec![reiman()]))]),
        OrchestratorConfig::default(),
    );

    let report = orch.run("What is the role of APOE4?", vec![]).await.unwrap();

    assert_eq!(report.status, SessionStatus::Done);
    assert_eq!(report.answer.citation_keys(), vec!["Reiman2020"]);
    assert_eq!(report.answer.citations[0].source_id.as_deref(), Some("PMC7320145"));
    assert_eq!(reasoner.calls(), 2);
    assert!(validate_history(&report.history).is_ok());

    let results = tool_results(&report.history);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].call_id, "call_1");
    assert!(results[0].is_success());
}

#[tokio::test]
async fn e2e_iteration_budget_is_enforced() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![search_corpus("call_1")]));
    let orch = Orchestrator::new(
        reasoner.clone(),
        registry(vec![Arc::new(StubProvider::corpus().citing(vec![reiman()]))]),
        OrchestratorConfig::default().with_max_iterations(3),
    );

    let failure = orch.run("Loop forever", vec![]).await.unwrap_err();

    assert_eq!(failure.kind(), "max_iterations_exceeded");
    assert_eq!(failure.status, SessionStatus::MaxIterations);
    assert_eq!(failure.iterations, 3);
    assert_eq!(reasoner.calls(), 3);
    assert!(!failure.history.iter().any(|m| m.role == Role::Assistant && !m.has_tool_calls()));
}

#[tokio::test]
async fn e2e_fabricated_citation_never_reaches_caller() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        search_corpus("call_1"),
        Message::assistant("Lecanemab halts decline completely (Smith2099; Reiman2020)."),
    ]));
    let orch = Orchestrator::new(
        reasoner,
        registry(vec![Arc::new(StubProvider::corpus().citing(vec![reiman()]))]),
        OrchestratorConfig::default(),
    );

    let failure = orch.run("Does lecanemab work?", vec![]).await.unwrap_err();

    match &failure.error {
        OrchestratorError::CitationIntegrity { unmatched } => {
            assert_eq!(unmatched, &vec!["Smith2099".to_string()]);
        }
        other => panic!("expected citation integrity error, got {other:?}"),
    }
    assert_eq!(failure.status, SessionStatus::Error);
}

#[tokio::test]
async fn e2e_citation_without_any_tool_call_fails_closed() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![Message::assistant(
        "Amyloid clearance slows decline (vanDyck2023).",
    )]));
    let orch = Orchestrator::new(
        reasoner,
        registry(vec![Arc::new(StubProvider::corpus())]),
        OrchestratorConfig::default(),
    );

    let failure = orch.run("Is amyloid causal?", vec![]).await.unwrap_err();
    assert_eq!(failure.kind(), "citation_integrity_error");
}

#[tokio::test(start_paused = true)]
async fn e2e_slow_provider_is_isolated() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Message::assistant_with_calls(
            "",
            vec![
                ToolCall::new("c1", "search_external_literature", json!({"query": "tau"})),
                ToolCall::new("c2", "query_papers", json!({"query": "tau"})),
            ],
        ),
        Message::assistant("Tau pathology tracks cognitive decline (Reiman2020)."),
    ]));
    let orch = Orchestrator::new(
        reasoner,
        registry(vec![
            Arc::new(StubProvider::corpus().citing(vec![reiman()])),
            Arc::new(StubProvider::external().slow(Duration::from_secs(600))),
        ]),
        OrchestratorConfig::default().with_per_tool_timeout(Duration::from_secs(5)),
    );

    let report = orch.run("How does tau relate to decline?", vec![]).await.unwrap();

    let results = tool_results(&report.history);
    assert_eq!(results.len(), 2);
    // Results come back in request order regardless of completion order.
    assert_eq!(results[0].call_id, "c1");
    assert_eq!(results[0].error_kind(), Some(ToolErrorKind::ToolTimeout));
    assert_eq!(results[1].call_id, "c2");
    assert!(results[1].is_success());
    assert_eq!(report.answer.citation_keys(), vec!["Reiman2020"]);
}

#[tokio::test]
async fn e2e_runs_are_deterministic() {
    async fn run_once() -> alzassist_agent::RunReport {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            search_corpus("call_1"),
            Message::assistant("APOE4 raises risk (Reiman2020)."),
        ]));
        let orch = Orchestrator::new(
            reasoner,
            registry(vec![Arc::new(StubProvider::corpus().citing(vec![reiman()]))]),
            OrchestratorConfig::default(),
        );
        orch.run("What is APOE4?", vec![]).await.unwrap()
    }

    let a = run_once().await;
    let b = run_once().await;

    assert_eq!(a.answer.text, b.answer.text);
    assert_eq!(a.answer.citations, b.answer.citations);
    assert_eq!(a.history.len(), b.history.len());
    for (x, y) in a.history.iter().zip(&b.history) {
        assert_eq!(x.role, y.role);
        assert_eq!(x.content, y.content);
        assert_eq!(x.tool_calls, y.tool_calls);
    }
    let kinds = |r: &alzassist_agent::RunReport| -> Vec<StatusKind> {
        r.events
            .iter()
            .map(|e| match &e.kind {
                StatusKind::ToolFinished { call_id, tool, outcome, .. } => StatusKind::ToolFinished {
                    call_id: call_id.clone(),
                    tool: tool.clone(),
                    outcome: outcome.clone(),
                    duration_ms: 0,
                },
                other => other.clone(),
            })
            .collect()
    };
    assert_eq!(kinds(&a), kinds(&b));
}

#[tokio::test]
async fn e2e_gated_routing_keeps_external_hidden_until_corpus_tried() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        call("c1", "search_external_literature", json!({"query": "GLP-1 agonists"})),
        Message::assistant("No curated evidence was retrieved."),
    ]));
    let orch = Orchestrator::new(
        reasoner,
        registry(vec![
            Arc::new(StubProvider::corpus()),
            Arc::new(StubProvider::external()),
        ]),
        OrchestratorConfig::default().with_routing(RoutingPolicy::Gated),
    );

    let report = orch.run("Do GLP-1 agonists help?", vec![]).await.unwrap();
    let results = tool_results(&report.history);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].error_kind(), Some(ToolErrorKind::ValidationError));
}

#[tokio::test]
async fn e2e_unavailable_corpus_is_fatal() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![search_corpus("call_1")]));
    let orch = Orchestrator::new(
        reasoner,
        registry(vec![Arc::new(
            StubProvider::corpus().broken(ToolError::unavailable("query_papers", "endpoint down")),
        )]),
        OrchestratorConfig::default(),
    );

    let failure = orch.run("What is APOE4?", vec![]).await.unwrap_err();
    assert_eq!(failure.kind(), "fatal_tool_failure");
    assert_eq!(failure.status, SessionStatus::Error);
    // The failing call is still answered in the committed history.
    assert!(validate_history(&failure.history).is_ok());
}

#[tokio::test]
async fn e2e_cancellation_stops_the_session() {
    let orch = Orchestrator::new(
        Arc::new(StalledReasoner),
        registry(vec![Arc::new(StubProvider::corpus())]),
        OrchestratorConfig::default(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let failure = orch
        .run_with_cancel("What is APOE4?", vec![], cancel)
        .await
        .unwrap_err();
    assert_eq!(failure.status, SessionStatus::Cancelled);
    assert_eq!(failure.kind(), "cancelled");
}

#[tokio::test]
async fn e2e_follow_up_turn_can_cite_earlier_results() {
    let first = Orchestrator::new(
        Arc::new(ScriptedReasoner::new(vec![
            search_corpus("call_1"),
            Message::assistant("APOE4 raises risk (Reiman2020)."),
        ])),
        registry(vec![Arc::new(StubProvider::corpus().citing(vec![reiman()]))]),
        OrchestratorConfig::default(),
    );
    let report = first.run("What is APOE4?", vec![]).await.unwrap();

    let second = Orchestrator::new(
        Arc::new(ScriptedReasoner::new(vec![Message::assistant(
            "As noted, APOE2 is protective (Reiman2020).",
        )])),
        registry(vec![Arc::new(StubProvider::corpus())]),
        OrchestratorConfig::default(),
    );
    let follow_up = second
        .run("And APOE2?", report.history.clone())
        .await
        .unwrap();

    assert_eq!(follow_up.answer.citation_keys(), vec!["Reiman2020"]);
    assert!(follow_up.history.len() > report.history.len());
}

#[tokio::test]
async fn e2e_knowledge_graph_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(NODES_FILE),
        "id\tcategory\tname\tdescription\tsynonym\texact_synonyms\tsymbol\tfull_name\tin_taxon_label\n\
HGNC:613\tbiolink:Gene\tAPOE\tapolipoprotein E\tAD2\t\tAPOE\tapolipoprotein E\tHomo sapiens\n\
MONDO:0004975\tbiolink:Disease\tAlzheimer disease\tA dementia\tAD\t\t\t\t\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join(EDGES_FILE),
        "subject\tpredicate\tobject\tcategory\tprimary_knowledge_source\tpublications\tknowledge_level\thas_evidence\tnegated\n\
HGNC:613\tbiolink:gene_associated_with_condition\tMONDO:0004975\tbiolink:Association\tinfores:omim\tPMID:8346443\tknowledge_assertion\t\tFalse\n",
    )
    .unwrap();

    let source = Arc::new(GraphSource::new(Some(dir.path().to_path_buf())));
    let tools: Vec<Arc<dyn Tool>> = KnowledgeGraphTool::all(source)
        .into_iter()
        .map(|t| Arc::new(t) as Arc<dyn Tool>)
        .collect();

    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Message::assistant_with_calls(
            "",
            vec![
                ToolCall::new("k1", "get_node_details", json!({"node_id": "HGNC:613"})),
                ToolCall::new("k2", "get_node_neighbors", json!({"node_id": "HGNC:613"})),
            ],
        ),
        Message::assistant("APOE is linked to Alzheimer disease in the knowledge graph."),
    ]));
    let orch = Orchestrator::new(reasoner, registry(tools), OrchestratorConfig::default());

    let report = orch.run("How is APOE connected to AD?", vec![]).await.unwrap();
    let results = tool_results(&report.history);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(results[0].to_wire()["name"], "APOE");
    assert_eq!(results[1].to_wire()[0]["object_id"], "MONDO:0004975");
}

#[tokio::test]
async fn e2e_corpus_disabled_for_session_stays_recoverable() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        search_corpus("call_1"),
        Message::assistant("The curated corpus is not available in this session."),
    ]));
    let orch = Orchestrator::new(
        reasoner.clone(),
        registry(vec![
            Arc::new(StubProvider::corpus().citing(vec![reiman()])),
            Arc::new(StubProvider::external()),
        ]),
        OrchestratorConfig::default()
            .with_enabled_tools(Some(vec!["search_external_literature".into()])),
    );

    let report = orch.run("What is APOE4?", vec![]).await.unwrap();

    assert_eq!(report.status, SessionStatus::Done);
    assert_eq!(reasoner.calls(), 2);
    let results = tool_results(&report.history);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].error_kind(), Some(ToolErrorKind::ToolUnavailable));
}

#[tokio::test]
async fn e2e_page_located_citation_is_checked() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        search_corpus("call_1"),
        Message::assistant("Risk doubles per allele (FakeAuthor2099 pages 1-2)."),
    ]));
    let orch = Orchestrator::new(
        reasoner,
        registry(vec![Arc::new(StubProvider::corpus())]),
        OrchestratorConfig::default(),
    );

    let failure = orch.run("What is APOE4?", vec![]).await.unwrap_err();
    assert_eq!(failure.kind(), "citation_integrity_error");
}
