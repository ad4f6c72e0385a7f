//! Shared test helpers: a scripted reasoner and configurable stub tools.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alzassist_core::citation::Citation;
use alzassist_core::error::{ReasonerError, ToolError};
use alzassist_core::message::Message;
use alzassist_core::reasoner::{Reasoner, ToolDefinition};
use alzassist_core::schema::{ParamSpec, ToolSpec};
use alzassist_core::tool::{Tool, ToolCall, ToolOutput, ToolRegistry, ToolRole};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

/// A reasoner that replays scripted replies in order.
///
/// With `looping`, the last reply is repeated forever. Panics when the
/// script runs out otherwise.
pub struct ScriptedReasoner {
    replies: Mutex<VecDeque<Result<Message, ReasonerError>>>,
    repeat: Option<Message>,
    calls: AtomicUsize,
    seen_tools: Mutex<Vec<Vec<String>>>,
}

impl ScriptedReasoner {
    pub fn new(replies: Vec<Message>) -> Self {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<Result<Message, ReasonerError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            seen_tools: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `reply`.
    pub fn looping(reply: Message) -> Self {
        let mut reasoner = Self::new(Vec::new());
        reasoner.repeat = Some(reply);
        reasoner
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tool names offered on each call.
    pub fn seen_tools(&self) -> Vec<Vec<String>> {
        self.seen_tools.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn propose_next_step(
        &self,
        _history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Message, ReasonerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tools
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());

        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.repeat {
            Some(reply) => Ok(reply.clone()),
            None => panic!("ScriptedReasoner: script exhausted after {} calls", self.call_count()),
        }
    }
}

/// An assistant turn requesting `calls` as `(id, tool, arguments)`.
pub fn calls(items: &[(&str, &str, Value)]) -> Message {
    Message::assistant_with_calls(
        "",
        items
            .iter()
            .map(|(id, name, args)| ToolCall::new(*id, *name, args.clone()))
            .collect(),
    )
}

#[derive(Clone)]
enum Behaviour {
    Succeed,
    Fail(ToolError),
    Panic,
}

/// A tool with a fixed reply, optional delay, and an invocation counter.
pub struct StubTool {
    spec: ToolSpec,
    role: ToolRole,
    citations: Vec<Citation>,
    delay: Option<Duration>,
    behaviour: Behaviour,
    invocations: Arc<AtomicUsize>,
}

impl StubTool {
    pub fn new(name: &str, role: ToolRole, citations: Vec<Citation>) -> Self {
        Self {
            spec: ToolSpec::new(name, format!("Stub {name}"))
                .param(ParamSpec::string("query", "Question").required()),
            role,
            citations,
            delay: None,
            behaviour: Behaviour::Succeed,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn corpus(citations: Vec<Citation>) -> Self {
        Self::new("query_papers", ToolRole::Primary, citations)
    }

    pub fn external(citations: Vec<Citation>) -> Self {
        Self::new("search_external_literature", ToolRole::External, citations)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, error: ToolError) -> Self {
        self.behaviour = Behaviour::Fail(error);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behaviour = Behaviour::Panic;
        self
    }

    pub fn invocations(&self) -> Arc<AtomicUsize> {
        self.invocations.clone()
    }
}

#[async_trait]
impl Tool for StubTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn role(&self) -> ToolRole {
        self.role
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behaviour {
            Behaviour::Succeed => Ok(ToolOutput::new(json!({
                "answer": format!("stub answer for {}", arguments["query"]),
                "citations": self.citations,
            }))
            .with_citations(self.citations.clone())),
            Behaviour::Fail(error) => Err(error.clone()),
            Behaviour::Panic => panic!("stub tool {} panicked", self.spec.name),
        }
    }
}

pub fn registry_of(tools: Vec<StubTool>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(Arc::new(tool));
    }
    registry
}
