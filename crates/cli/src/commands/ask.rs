//! `alzassist ask` — Answer one question.

use super::{build_orchestrator, load_config, print_failure};

pub async fn run(
    query: String,
    max_iterations: Option<u32>,
    tools: Option<Vec<String>>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config, max_iterations, tools)?;

    eprint!("  Researching...");
    let outcome = orchestrator.run(&query, Vec::new()).await;
    eprint!("\r                \r");

    match outcome {
        Ok(report) if json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok(report) => {
            println!("{}", report.answer.text);
            if !report.answer.citations.is_empty() {
                println!();
                println!("References:");
                for (i, citation) in report.answer.citations.iter().enumerate() {
                    let text = citation.citation.as_deref().unwrap_or("");
                    println!("  [{}] {} {}", i + 1, citation.key, text);
                }
            }
        }
        Err(failure) => {
            if json {
                let body = serde_json::json!({
                    "session_id": failure.session_id,
                    "status": failure.status,
                    "error": failure.kind(),
                    "message": failure.error.to_string(),
                    "iterations": failure.iterations,
                    "events": failure.events,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                print_failure(&failure);
            }
            return Err(format!("session ended with {}", failure.kind()).into());
        }
    }

    Ok(())
}
