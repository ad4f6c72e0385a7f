//! `alzassist chat` — Interactive mode. Every turn continues the history
//! of the last successful turn, so earlier citations stay citable.

use std::io::Write;

use alzassist_core::message::Message;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{build_orchestrator, load_config, print_failure};

pub async fn run(max_iterations: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config, max_iterations, None)?;

    println!();
    println!("  AlzAssist — Interactive Mode");
    println!();
    println!("  Provider:  {}", config.reasoner.provider);
    println!("  Model:     {}", config.reasoner.model);
    println!(
        "  Tools:     {}",
        orchestrator.dispatcher().registry().names().join(", ")
    );
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let outcome = orchestrator.run(query, history.clone()).await;
        eprint!("\r     \r");

        match outcome {
            Ok(report) => {
                println!();
                for line in report.answer.text.lines() {
                    println!("  AlzAssist > {line}");
                }
                for (i, citation) in report.answer.citations.iter().enumerate() {
                    println!("    [{}] {}", i + 1, citation.key);
                }
                println!();
                history = report.history;
            }
            Err(failure) => {
                // The failed turn is dropped; history stays at the last good turn.
                print_failure(&failure);
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
