//! `alzassist doctor` — Diagnose configuration and providers.

use alzassist_config::AppConfig;
use alzassist_tools::knowledge_graph::{EDGES_FILE, NODES_FILE};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 AlzAssist Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("  ✅ Config file found: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file — using defaults (run `alzassist onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Cannot continue without a valid config.");
            return Ok(());
        }
    };

    // Reasoner
    if config.has_api_key() {
        println!("  ✅ API key configured for '{}'", config.reasoner.provider);
    } else if alzassist_reasoner::router::requires_api_key(&config.reasoner.provider) {
        println!("  ❌ No API key for '{}' — set OPENROUTER_API_KEY", config.reasoner.provider);
        issues += 1;
    } else {
        println!("  ✅ Local reasoner '{}' needs no API key", config.reasoner.provider);
    }

    // Corpus
    match &config.corpus.endpoint {
        Some(endpoint) => println!(
            "  ✅ Corpus endpoint: {endpoint} (default corpus '{}')",
            config.corpus.default_corpus
        ),
        None => {
            println!("  ❌ No corpus endpoint — query_papers will be unavailable");
            issues += 1;
        }
    }

    // Knowledge graph
    match &config.knowledge_graph.data_dir {
        Some(dir) => {
            let missing: Vec<_> = [NODES_FILE, EDGES_FILE]
                .into_iter()
                .filter(|f| !dir.join(f).is_file())
                .collect();
            if missing.is_empty() {
                println!("  ✅ Knowledge graph data in {}", dir.display());
            } else {
                println!("  ❌ Missing in {}: {}", dir.display(), missing.join(", "));
                issues += 1;
            }
        }
        None => println!("  ⚠️  No knowledge_graph.data_dir — KG tools will be unavailable"),
    }

    // Plot output directory
    let plot_dir = &config.plotting.output_dir;
    match std::fs::create_dir_all(plot_dir).and_then(|_| {
        let marker = plot_dir.join(".doctor_write_check");
        std::fs::write(&marker, b"ok")?;
        std::fs::remove_file(&marker)
    }) {
        Ok(()) => println!("  ✅ Plot directory writable: {}", plot_dir.display()),
        Err(e) => {
            println!("  ❌ Plot directory {} not writable: {e}", plot_dir.display());
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
