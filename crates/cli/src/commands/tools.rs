//! `alzassist tools` — Print the registry's tool specs.

use alzassist_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = alzassist_tools::default_registry(&config);

    let specs: Vec<_> = registry
        .definitions()
        .into_iter()
        .map(|def| {
            serde_json::json!({
                "name": def.name,
                "role": registry.role_of(&def.name),
                "description": def.description,
                "parameters": def.parameters,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&specs)?);
    Ok(())
}
