//! OpenAI-compatible HTTP backend.
//!
//! RiCA threads reason over a raw text context rather than a chat transcript,
//! so this adapter targets the completions endpoint
//! (`/v1/completions`) of any OpenAI-compatible server (vLLM, llama.cpp,
//! text-generation-inference) with `stream: true` and parses the SSE `data:`
//! lines as they arrive.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::{RicaError, RicaResult};

use super::Backend;

pub struct OpenAiCompatBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body(&self, prompt: &str, config: &GenerationConfig) -> serde_json::Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": config.max_new_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "stream": true,
        })
    }
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        token_tx: mpsc::UnboundedSender<String>,
    ) -> RicaResult<String> {
        let url = format!("{}/v1/completions", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&self.build_body(prompt, config));

        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(RicaError::RateLimited {
                    retry_after_ms: 5000,
                });
            }
            return Err(RicaError::Backend(format!(
                "completion API error {status}: {body}"
            )));
        }

        let mut completion = String::new();
        let mut buffer = String::new();
        let mut response = response;

        while let Some(chunk) = response.chunk().await? {
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process complete lines; keep the partial tail in the buffer.
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                let Some(data_str) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data_str.trim() == "[DONE]" {
                    debug!(model = %self.model, chars = completion.len(), "stream complete");
                    return Ok(completion);
                }

                if let Ok(data) = serde_json::from_str::<serde_json::Value>(data_str) {
                    let text = data
                        .get("choices")
                        .and_then(|v| v.as_array())
                        .and_then(|choices| choices.first())
                        .and_then(|choice| choice.get("text"))
                        .and_then(|v| v.as_str());

                    if let Some(text) = text {
                        if !text.is_empty() {
                            completion.push_str(text);
                            if token_tx.send(text.to_string()).is_err() {
                                // Consumer gone; stop pulling the stream.
                                return Ok(completion);
                            }
                        }
                    }
                }
            }
        }

        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_completion_body() {
        let backend = OpenAiCompatBackend::new("http://localhost:8000", "test-model");
        let config = GenerationConfig {
            max_new_tokens: 256,
            temperature: 0.2,
            top_p: 0.95,
        };

        let body = backend.build_body("context text", &config);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["prompt"], "context text");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn backend_name_and_model() {
        let backend =
            OpenAiCompatBackend::new("http://localhost:8000", "m").with_api_key("secret");
        assert_eq!(backend.name(), "openai-compat");
        assert_eq!(backend.model(), "m");
    }
}
