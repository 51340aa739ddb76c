//! Generative capability consumed by the answerer and the summarizer.
//!
//! docsage never implements a language model. Backends implement
//! [`Generator`] in the application crate; a missing generator is a normal
//! configuration and both consumers fall back to extractive output.

use async_trait::async_trait;

use crate::error::PipelineResult;

/// A single-turn prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Short backend identifier used in logs.
    fn name(&self) -> &str;

    /// Produce a completion for `prompt`.
    ///
    /// Fails with [`PipelineError::CapabilityUnavailable`](crate::PipelineError::CapabilityUnavailable)
    /// when the backend is unreachable, times out or rejects the request.
    async fn generate(&self, prompt: &Prompt) -> PipelineResult<String>;
}
