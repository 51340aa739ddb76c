//! Generative capability backends.
//!
//! Implementations of the core [`Generator`] trait for OpenAI-compatible
//! chat completions and Ollama's `/api/generate`. Each call is a single
//! attempt bounded by `generation.timeout_secs`; any failure surfaces as
//! `CapabilityUnavailable` and the caller falls back to its extractive path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use docsage_core::generate::{Generator, Prompt};
use docsage_core::{PipelineError, PipelineResult};

use crate::config::GenerationConfig;
use crate::embedding::post_with_retry;

pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key,
            temperature: config.temperature,
            client: client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> PipelineResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "max_tokens": prompt.max_tokens,
            "temperature": self.temperature,
        });
        let json = post_with_retry(
            &self.client,
            &format!("{}/v1/chat/completions", self.url.trim_end_matches('/')),
            Some(&self.api_key),
            &body,
            0,
            "OpenAI",
        )
        .await
        .map_err(PipelineError::CapabilityUnavailable)?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> PipelineResult<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            PipelineError::CapabilityUnavailable(
                "invalid chat completion response: missing choices[0].message.content".to_string(),
            )
        })
}

pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            temperature: config.temperature,
            client: client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> PipelineResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "system": prompt.system,
            "prompt": prompt.user,
            "stream": false,
            "options": {
                "num_predict": prompt.max_tokens,
                "temperature": self.temperature,
            },
        });
        let json = post_with_retry(
            &self.client,
            &format!("{}/api/generate", self.url.trim_end_matches('/')),
            None,
            &body,
            0,
            "Ollama",
        )
        .await
        .map_err(PipelineError::CapabilityUnavailable)?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::CapabilityUnavailable(
                    "invalid Ollama response: missing response".to_string(),
                )
            })
    }
}

fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// The configured generator, or `None` when `generation.provider = "disabled"`
/// or the OpenAI provider has no `OPENAI_API_KEY`.
pub fn create_generator(config: &GenerationConfig) -> Result<Option<Arc<dyn Generator>>> {
    build_generator(config, std::env::var("OPENAI_API_KEY").ok())
}

fn build_generator(
    config: &GenerationConfig,
    openai_key: Option<String>,
) -> Result<Option<Arc<dyn Generator>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => match openai_key {
            Some(key) => Ok(Some(Arc::new(OpenAIGenerator::new(config, key)?))),
            None => {
                tracing::warn!("OPENAI_API_KEY not set, generation disabled; answers and summaries will be extractive");
                Ok(None)
            }
        },
        "ollama" => Ok(Some(Arc::new(OllamaGenerator::new(config)?))),
        other => bail!("Unknown generation provider: {}", other),
    }
}
