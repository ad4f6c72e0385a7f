//! Session state for one query.
//!
//! A session owns the append-only message history, the iteration
//! counter, the accumulated citation pool, and the terminal status. It
//! enforces its own invariants: causal message ordering, a bounded
//! iteration count, and exactly one terminal transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::citation::CitationPool;
use crate::error::SessionError;
use crate::message::{Content, Message, Role, SessionId};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Done,
    MaxIterations,
    Error,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Done => "done",
            Self::MaxIterations => "max_iterations",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental checker for the message-ordering invariant: every tool
/// message answers a call of the most recent assistant message, and all
/// of those calls are answered before anything else is appended.
#[derive(Debug, Clone, Default)]
struct OrderingTracker {
    pending: Vec<String>,
    answered: Vec<String>,
}

impl OrderingTracker {
    fn check(&self, position: usize, msg: &Message) -> Result<(), SessionError> {
        if msg.has_tool_calls() && msg.role != Role::Assistant {
            return Err(SessionError::MisplacedToolCalls {
                position,
                role: msg.role.as_str().into(),
            });
        }

        match msg.role {
            Role::Tool => {
                let call_id = msg.tool_call_id.clone().unwrap_or_default();
                if self.answered.contains(&call_id) {
                    return Err(SessionError::DuplicateToolAnswer { call_id });
                }
                if !self.pending.contains(&call_id) {
                    return Err(SessionError::OrphanToolMessage { position, call_id });
                }
                Ok(())
            }
            Role::User | Role::Assistant => match self.pending.first() {
                Some(call_id) => Err(SessionError::UnansweredToolCall {
                    position,
                    call_id: call_id.clone(),
                }),
                None => Ok(()),
            },
        }
    }

    fn record(&mut self, msg: &Message) {
        match msg.role {
            Role::Tool => {
                if let Some(call_id) = &msg.tool_call_id {
                    self.pending.retain(|p| p != call_id);
                    self.answered.push(call_id.clone());
                }
            }
            Role::Assistant => {
                self.pending = msg.tool_calls.iter().map(|c| c.id.clone()).collect();
                self.answered.clear();
            }
            Role::User => {}
        }
    }

    fn finish(&self, position: usize) -> Result<(), SessionError> {
        match self.pending.first() {
            Some(call_id) => Err(SessionError::UnansweredToolCall {
                position,
                call_id: call_id.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Check that a complete history satisfies the ordering invariant.
pub fn validate_history(messages: &[Message]) -> Result<(), SessionError> {
    let mut tracker = OrderingTracker::default();
    for (position, msg) in messages.iter().enumerate() {
        tracker.check(position, msg)?;
        tracker.record(msg);
    }
    tracker.finish(messages.len())
}

/// One query's conversation state, exclusively owned by a single run.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    messages: Vec<Message>,
    iteration: u32,
    max_iterations: u32,
    status: SessionStatus,
    citations: CitationPool,
    tracker: OrderingTracker,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session with an iteration budget.
    pub fn new(max_iterations: u32) -> Self {
        Self {
            id: SessionId::new(),
            messages: Vec::new(),
            iteration: 0,
            max_iterations,
            status: SessionStatus::Active,
            citations: CitationPool::new(),
            tracker: OrderingTracker::default(),
            created_at: Utc::now(),
        }
    }

    /// Create a session continuing a prior conversation.
    ///
    /// The prior history must satisfy the ordering invariant. Citations
    /// returned by tool results in it join this session's pool.
    pub fn with_history(max_iterations: u32, prior: Vec<Message>) -> Result<Self, SessionError> {
        validate_history(&prior)?;
        let mut session = Self::new(max_iterations);
        for msg in prior {
            session.push(msg)?;
        }
        Ok(session)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn citations(&self) -> &CitationPool {
        &self.citations
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append a message, enforcing ordering. Successful tool results add
    /// their citations to the pool.
    pub fn push(&mut self, msg: Message) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.tracker.check(self.messages.len(), &msg)?;
        self.tracker.record(&msg);

        if let Content::ToolResult { result } = &msg.content {
            self.citations.extend(result.citations().iter().cloned());
        }
        self.messages.push(msg);
        Ok(())
    }

    /// Start a new reason→act cycle. Fails once the budget is spent.
    pub fn begin_iteration(&mut self) -> Result<u32, SessionError> {
        self.ensure_active()?;
        if self.iteration >= self.max_iterations {
            return Err(SessionError::IterationBudgetExhausted(self.max_iterations));
        }
        self.iteration += 1;
        Ok(self.iteration)
    }

    /// Move to a terminal status. Allowed exactly once.
    pub fn terminate(&mut self, status: SessionStatus) -> Result<(), SessionError> {
        self.ensure_active()?;
        if !status.is_terminal() {
            return Ok(());
        }
        self.status = status;
        Ok(())
    }

    /// Consume the session, yielding its history.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::AlreadyTerminated(self.status.as_str().into()));
        }
        Ok(())
    }
}
