// src/ai/mod.rs
//! LLM client abstraction shared by ranking, similarity and generation.
//!
//! Every call site goes through [`complete_within`], so a hung provider turns into an
//! `AiError::Timeout` and each caller applies its own fallback.

pub mod parse;
pub mod provider;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::error::{AiError, ConfigError};

pub use provider::{GeminiProvider, OpenAiProvider};

/// Text-in, text-out completion.
pub trait LlmClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynLlm = Arc<dyn LlmClient>;

/// Always fails with `AiError::Disabled`; callers fall back.
pub struct DisabledClient;

impl LlmClient for DisabledClient {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
        Box::pin(async { Err(AiError::Disabled) })
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Run one completion with a hard deadline.
pub async fn complete_within(
    llm: &dyn LlmClient,
    prompt: &str,
    limit: Duration,
) -> Result<String, AiError> {
    match tokio::time::timeout(limit, llm.complete(prompt)).await {
        Ok(res) => res,
        Err(_) => Err(AiError::Timeout(limit.as_secs())),
    }
}

/// Build the configured provider. A missing key is a config error; an explicit
/// `provider = "disabled"` yields [`DisabledClient`].
pub fn build_client(settings: &Settings) -> Result<DynLlm, ConfigError> {
    let timeout = Duration::from_secs(settings.ai.timeout_secs);
    let model = settings.ai.model.as_deref();
    let Some(key) = settings.resolve_ai_key()? else {
        tracing::warn!("AI provider disabled, ranking and similarity will use fallbacks");
        return Ok(Arc::new(DisabledClient));
    };

    let client: DynLlm = match settings.ai.provider.as_str() {
        "openai" => Arc::new(OpenAiProvider::new(key, model, timeout).map_err(build_err)?),
        _ => Arc::new(GeminiProvider::new(key, model, timeout).map_err(build_err)?),
    };
    tracing::info!(provider = client.provider_name(), "AI client ready");
    Ok(client)
}

fn build_err(e: AiError) -> ConfigError {
    ConfigError::Invalid(vec![format!("cannot build AI client: {e}")])
}
