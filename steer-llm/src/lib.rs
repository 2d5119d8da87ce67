//! Provider‑agnostic LLM integration for Steer.
//!
//! This crate exposes a common [`traits::LlmClient`] interface and concrete
//! provider implementations for Ollama and OpenAI-compatible endpoints. It
//! also provides a convenience function to initialize a client from a
//! [`steer_common::LlmConfig`].
pub mod ollama;
pub mod openai;
pub mod traits;

use ollama::OllamaClient;
use openai::OpenAiClient;
use std::sync::Arc;
use steer_common::{LlmConfig, Result};
use traits::LlmClient;

/// Default model recommendations for planning browser actions.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Ensure an LLM client is ready (e.g., probing servers or pulling models).
pub async fn ensure_llm_ready(config: &LlmConfig) -> Result<Arc<dyn LlmClient + Send + Sync>> {
    match config {
        LlmConfig::Ollama {
            endpoint, model, ..
        } => {
            let client = OllamaClient::new(endpoint.clone(), model.clone()).await?;
            Ok(Arc::new(client))
        }
        LlmConfig::Openai {
            endpoint,
            auth_token,
            model,
            ..
        } => {
            let client =
                OpenAiClient::new(endpoint.clone(), auth_token.clone(), model.clone())?;
            Ok(Arc::new(client))
        }
    }
}
