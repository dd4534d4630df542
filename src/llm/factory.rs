//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use tracing::info;

use crate::config::LlmSettings;
use crate::error::{Result, SheetqlError};
use crate::llm::{
    ollama, openai, LlmClient, LlmProvider, MockLlmClient, OllamaClient, OllamaConfig,
    OpenAiClient, OpenAiConfig,
};

/// Creates an LLM client from resolved settings.
///
/// OpenAI-compatible servers other than api.openai.com (Ollama's `/v1`,
/// vLLM, LM Studio) usually run without a key, so a key is only demanded
/// when the public endpoint is used.
pub fn create_client(settings: &LlmSettings) -> Result<Box<dyn LlmClient>> {
    let client: Box<dyn LlmClient> = match settings.provider {
        LlmProvider::OpenAi => {
            let base_url = settings
                .base_url
                .clone()
                .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string());
            if settings.api_key.is_none() && is_public_openai(&base_url) {
                return Err(SheetqlError::llm(
                    "No API key configured. Set OPENAI_API_KEY or point OPENAI_BASE_URL at a local server.",
                ));
            }

            let model = settings
                .model
                .clone()
                .unwrap_or_else(|| openai::DEFAULT_MODEL.to_string());
            let config = OpenAiConfig::new(settings.api_key.clone(), model)
                .with_base_url(base_url)
                .with_timeout(settings.timeout_secs.unwrap_or(openai::DEFAULT_TIMEOUT_SECS));
            Box::new(OpenAiClient::new(config)?)
        }
        LlmProvider::Ollama => {
            let model = settings
                .model
                .clone()
                .unwrap_or_else(|| ollama::DEFAULT_MODEL.to_string());
            let mut config = OllamaConfig::new(model)
                .with_timeout(settings.timeout_secs.unwrap_or(ollama::DEFAULT_TIMEOUT_SECS));
            if let Some(url) = &settings.base_url {
                config = config.with_url(url.clone());
            }
            Box::new(OllamaClient::new(config)?)
        }
        LlmProvider::Mock => Box::new(MockLlmClient::new()),
    };

    info!(
        provider = %settings.provider,
        model = settings.model.as_deref().unwrap_or("default"),
        "LLM client ready"
    );
    Ok(client)
}

fn is_public_openai(base_url: &str) -> bool {
    url::Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case("api.openai.com")))
        .unwrap_or(false)
}
