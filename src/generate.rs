//! Generation provider abstraction.
//!
//! The generative model is an external collaborator reached through a
//! prompt-in, text-out contract. Two backends:
//!
//! - **[`StaticGenerator`]** — returns a fixed reply; offline runs and tests.
//! - **[`OpenAiGenerator`]** — OpenAI-style chat completions endpoint with
//!   the same timeout/retry shape as the embedding provider.
//!
//! A failed or timed-out call fails only the turn that issued it; sessions
//! decide what to do with the error.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::GenerationConfig;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation timed out after {0}s")]
    Timeout(u64),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("generation provider misconfigured: {0}")]
    Config(String),
}

/// External generative model: assembled prompt in, answer text out.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Create the generator named by the configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>, GenerationError> {
    match config.provider.as_str() {
        "static" => Ok(Arc::new(StaticGenerator::new(&config.static_reply))),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        other => Err(GenerationError::Config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

// ============ Static Provider ============

/// Deterministic generator returning a configured fixed reply.
pub struct StaticGenerator {
    reply: String,
}

impl StaticGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl Generator for StaticGenerator {
    fn model_name(&self) -> &str {
        "static"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Ok(self.reply.clone())
    }
}

// ============ OpenAI-style HTTP Provider ============

/// Chat-completions generator. Requires `OPENAI_API_KEY`.
pub struct OpenAiGenerator {
    model: String,
    endpoint: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let model = config.model.clone().ok_or_else(|| {
            GenerationError::Config("generation.model required for openai provider".to_string())
        })?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(GenerationError::Config(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }

        Ok(Self {
            model,
            endpoint: config.endpoint.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| GenerationError::Config("OPENAI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(GenerationError::Request(format!(
                            "generation API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(GenerationError::Request(format!(
                        "generation API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) if e.is_timeout() => {
                    return Err(GenerationError::Timeout(self.timeout_secs));
                }
                Err(e) => {
                    last_err = Some(GenerationError::Request(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| GenerationError::Request("generation failed after retries".into())))
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, GenerationError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            GenerationError::InvalidResponse("missing choices[0].message.content".to_string())
        })
}
