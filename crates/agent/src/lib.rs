//! The orchestration loop: the heart of AlzAssist.
//!
//! The orchestrator follows a **Reason → Act → Observe** cycle:
//!
//! 1. **Receive** a user query (optionally continuing prior history)
//! 2. **Reason**: the reasoner proposes the next step
//! 3. **Act**: if tool calls are proposed, the dispatcher executes them
//!    concurrently, each bounded by the per-tool timeout
//! 4. **Observe**: results are appended to the session; loop back to 2
//! 5. **Finalize**: a reply without tool calls is checked by the citation
//!    validator and returned, or rejected
//!
//! The loop ends on a validated answer, on iteration exhaustion, or on a
//! terminal failure. It never returns an answer citing anything the
//! session's tools did not return.

pub mod citation_validator;
pub mod dispatcher;
pub mod instructions;
pub mod orchestrator;
pub mod routing;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::{DispatchCancelled, Dispatched, Dispatcher, ToolAvailability};
pub use orchestrator::{FinalAnswer, Orchestrator, OrchestratorConfig, RunFailure, RunReport};
pub use routing::{RoutingDecision, RoutingPolicy};
pub use tokio_util::sync::CancellationToken;
