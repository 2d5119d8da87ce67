//! Common types and utilities shared across Steer crates.
//!
//! This crate defines provider configuration, observability helpers, and
//! shared error types used throughout the Steer workspace. It is
//! intentionally lightweight so that all crates can depend on it without
//! introducing heavy transitive costs.
//!
//! # Overview
//!
//! - [`LlmConfig`]: Provider‑agnostic LLM configuration
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`SteerError`] and [`Result`]: Shared error handling
use serde::{Deserialize, Serialize};

pub mod observability;

/// Configuration for the LLM provider that plans browser actions.
///
/// See the `steer-llm` crate for the concrete client implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmConfig {
    Openai {
        model: String,
        auth_token: String,
        #[serde(default = "default_openai_endpoint")]
        endpoint: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Ollama {
        model: String,
        #[serde(default = "default_ollama_endpoint")]
        endpoint: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".into()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::Ollama {
            model: "llama3.2:3b".to_string(),
            endpoint: default_ollama_endpoint(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Error types used across the Steer system.
#[derive(thiserror::Error, Debug)]
pub enum SteerError {
    /// The agent loop failed to complete a requested operation.
    #[error("Agent error: {0}")]
    Agent(String),

    /// A driver (browser, network, etc.) reported an error.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The human-in-the-loop channel failed or was closed.
    #[error("Human channel error: {0}")]
    Human(String),

    /// Operation exceeded the configured timeout.
    #[error("Timeout occurred")]
    Timeout,
}

/// Convenient alias for results that use [`SteerError`].
pub type Result<T> = std::result::Result<T, SteerError>;
