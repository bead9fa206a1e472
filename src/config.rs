//! Runtime configuration.
//!
//! The default model can be overridden with the `RICA_DEFAULT_MODEL`
//! environment variable.

use serde::{Deserialize, Serialize};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "google/gemma3-4b-it";

/// Resolve the default model name, honoring `RICA_DEFAULT_MODEL`.
pub fn default_model() -> String {
    std::env::var("RICA_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string())
}

/// Sampling parameters handed to the backend for each generation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
}

fn default_max_new_tokens() -> usize {
    1024
}

fn default_temperature() -> f64 {
    0.6
}

fn default_top_p() -> f64 {
    0.9
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

/// Top-level runtime configuration for a reasoning thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Base URL for the HTTP backend, when one is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            generation: GenerationConfig::default(),
            base_url: None,
        }
    }
}
