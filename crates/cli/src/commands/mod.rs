pub mod ask;
pub mod chat;
pub mod doctor;
pub mod onboard;
pub mod tools;

use std::sync::Arc;

use alzassist_agent::{Dispatcher, Orchestrator, OrchestratorConfig, RunFailure, instructions};
use alzassist_config::AppConfig;
use alzassist_core::event::StatusKind;

/// Load the config, failing with setup instructions when no API key is set.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && alzassist_reasoner::router::requires_api_key(&config.reasoner.provider) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...   (recommended)");
        eprintln!("    OPENAI_API_KEY=sk-...             (for OpenAI direct)");
        eprintln!("    ALZASSIST_API_KEY=sk-...          (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    Ok(config)
}

/// Wire registry, reasoner and orchestrator from config.
pub fn build_orchestrator(
    config: &AppConfig,
    max_iterations: Option<u32>,
    tools: Option<Vec<String>>,
) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let registry = Arc::new(alzassist_tools::default_registry(config));

    let mut orchestrator_config = OrchestratorConfig::from(config);
    if let Some(max) = max_iterations {
        if max == 0 {
            return Err("--max-iterations must be at least 1".into());
        }
        orchestrator_config = orchestrator_config.with_max_iterations(max);
    }
    if let Some(tools) = tools {
        if let Some(unknown) = tools.iter().find(|t| !registry.contains(t)) {
            return Err(format!(
                "unknown tool '{unknown}' (available: {})",
                registry.names().join(", ")
            )
            .into());
        }
        orchestrator_config = orchestrator_config.with_enabled_tools(Some(tools));
    }

    // The prompt describes only the tools this session can reach.
    let session_tools = Dispatcher::new(registry.clone(), orchestrator_config.per_tool_timeout)
        .with_enabled_tools(orchestrator_config.enabled_tools.clone())
        .availability(orchestrator_config.routing, false);
    let reasoner = alzassist_reasoner::build_from_config(&config.reasoner)?
        .with_system_prompt(instructions::system_prompt(&session_tools));

    tracing::debug!(
        model = reasoner.model(),
        tools = registry.len(),
        max_iterations = orchestrator_config.max_iterations,
        "Orchestrator ready"
    );

    Ok(Orchestrator::new(
        Arc::new(reasoner),
        registry,
        orchestrator_config,
    ))
}

/// One line per status event, for the failure trail.
pub fn describe(kind: &StatusKind) -> String {
    match kind {
        StatusKind::ReasonerInvoked => "reasoner invoked".into(),
        StatusKind::ToolStarted { tool, call_id } => format!("{tool} started ({call_id})"),
        StatusKind::ToolFinished {
            tool,
            outcome,
            duration_ms,
            ..
        } => format!("{tool} finished: {outcome} in {duration_ms}ms"),
        StatusKind::RoutingAdvisory { tool, reason } => format!("routing advisory for {tool}: {reason}"),
        StatusKind::Finalized { citations } => format!("finalized with {} citation(s)", citations.len()),
        StatusKind::Terminated { status } => format!("terminated: {status}"),
    }
}

pub fn print_failure(failure: &RunFailure) {
    eprintln!("  [{}] {}", failure.kind(), failure.error);
    eprintln!("  Status trail:");
    for event in &failure.events {
        eprintln!("    #{} (iteration {}) {}", event.seq, event.iteration, describe(&event.kind));
    }
}
