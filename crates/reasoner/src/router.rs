//! Reasoner router: builds the configured back-end from config.
//!
//! Every supported provider speaks the OpenAI chat-completions dialect;
//! the provider name only selects the default base URL and whether an
//! API key is mandatory.

use std::time::Duration;

use alzassist_config::ReasonerConfig;
use alzassist_core::error::ReasonerError;

use crate::openai_compat::OpenAiCompatReasoner;

/// Build the reasoner described by `config`.
///
/// Fails with `NotConfigured` when a hosted provider has no API key.
pub fn build_from_config(config: &ReasonerConfig) -> Result<OpenAiCompatReasoner, ReasonerError> {
    let api_key = match (&config.api_key, requires_api_key(&config.provider)) {
        (Some(key), _) => key.clone(),
        (None, false) => config.provider.clone(),
        (None, true) => {
            return Err(ReasonerError::NotConfigured(format!(
                "no API key for provider '{}' (set ALZASSIST_API_KEY or reasoner.api_key)",
                config.provider
            )));
        }
    };

    let base_url = match &config.api_url {
        Some(url) => url.clone(),
        None => default_base_url(&config.provider).ok_or_else(|| {
            ReasonerError::NotConfigured(format!(
                "unknown provider '{}' and no reasoner.api_url given",
                config.provider
            ))
        })?,
    };

    tracing::debug!(provider = %config.provider, base_url = %base_url, model = %config.model, "Building reasoner");

    Ok(
        OpenAiCompatReasoner::new(&config.provider, base_url, api_key, &config.model)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_timeout(Duration::from_secs(config.timeout_secs)),
    )
}

/// Local servers accept any bearer token.
pub fn requires_api_key(provider_name: &str) -> bool {
    !matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> Option<String> {
    let url = match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "openai" => "https://api.openai.com/v1",
        "ollama" => "http://localhost:11434/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "together" => "https://api.together.xyz/v1",
        "vllm" => "http://localhost:8000/v1",
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1",
        _ => return None,
    };
    Some(url.to_string())
}
