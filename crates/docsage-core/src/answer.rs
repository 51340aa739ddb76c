//! Answer composition over retrieved chunks.
//!
//! The generative path sends the ranked passages and the question to the
//! configured [`Generator`]. When there is no generator, or it fails or
//! returns nothing, the top passage is returned verbatim (trimmed) under a
//! fixed header so the caller always gets a usable answer.

use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::generate::{Generator, Prompt};
use crate::models::AnswerMode;

const SYSTEM_PROMPT: &str = "You answer questions using only the provided document excerpts. \
If the excerpts do not contain the answer, say so. Answer in the language of the question.";

/// A retrieved chunk with its source attribution, in rank order.
#[derive(Debug, Clone)]
pub struct Passage {
    pub filename: String,
    pub ordinal: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub mode: AnswerMode,
}

#[derive(Debug, Clone, Copy)]
pub struct AnswerParams {
    /// Character budget for the extracted-passage fallback.
    pub fallback_max_chars: usize,
    pub max_tokens: u32,
}

impl Default for AnswerParams {
    fn default() -> Self {
        Self {
            fallback_max_chars: 1200,
            max_tokens: 800,
        }
    }
}

pub struct Answerer {
    generator: Option<Arc<dyn Generator>>,
    params: AnswerParams,
}

impl Answerer {
    pub fn new(generator: Option<Arc<dyn Generator>>, params: AnswerParams) -> Self {
        Self { generator, params }
    }

    /// Answer `query` from `passages`, attributing the fallback to `label`.
    ///
    /// Only fails when `passages` is empty.
    pub async fn answer(
        &self,
        query: &str,
        passages: &[Passage],
        label: &str,
    ) -> PipelineResult<Answer> {
        let top = passages
            .first()
            .ok_or_else(PipelineError::no_chunks_in_corpus)?;

        if let Some(generator) = &self.generator {
            let prompt = build_prompt(query, passages, self.params.max_tokens);
            match generator.generate(&prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Ok(Answer {
                        text: text.trim().to_string(),
                        mode: AnswerMode::Generated,
                    });
                }
                Ok(_) => {
                    tracing::warn!(generator = generator.name(), "empty answer, using extracted passage");
                }
                Err(e) => {
                    tracing::warn!(generator = generator.name(), error = %e, "answer generation failed, using extracted passage");
                }
            }
        }

        Ok(Answer {
            text: extracted_answer(label, &top.text, self.params.fallback_max_chars),
            mode: AnswerMode::Extracted,
        })
    }
}

/// Build the question-answering prompt with passages in rank order.
pub fn build_prompt(query: &str, passages: &[Passage], max_tokens: u32) -> Prompt {
    let mut user = String::from("Document excerpts:\n\n");
    for (i, p) in passages.iter().enumerate() {
        user.push_str(&format!(
            "[{}] {} (chunk {}):\n{}\n\n",
            i + 1,
            p.filename,
            p.ordinal,
            p.text.trim()
        ));
    }
    user.push_str("Question: ");
    user.push_str(query.trim());
    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
        max_tokens,
    }
}

/// Deterministic fallback answer built from the top-ranked passage.
pub fn extracted_answer(label: &str, passage: &str, max_chars: usize) -> String {
    format!(
        "Extracted passage from \"{}\" (no generated answer available):\n\n{}",
        label,
        truncate_at_word(passage.trim(), max_chars)
    )
}

/// Cut `text` to at most `max_chars` characters, preferring the last word
/// boundary, and mark the cut with an ellipsis.
pub fn truncate_at_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    let cut = match head.rfind(char::is_whitespace) {
        Some(i) if i > 0 => &head[..i],
        _ => head.as_str(),
    };
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Canned(PipelineResult<String>);

    #[async_trait]
    impl Generator for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn generate(&self, _prompt: &Prompt) -> PipelineResult<String> {
            self.0.clone()
        }
    }

    fn passages() -> Vec<Passage> {
        vec![
            Passage {
                filename: "report.pdf".to_string(),
                ordinal: 3,
                text: "  Revenue grew by twelve percent in the third quarter.  ".to_string(),
            },
            Passage {
                filename: "notes.txt".to_string(),
                ordinal: 0,
                text: "Costs were flat.".to_string(),
            },
        ]
    }

    fn answerer(generator: Option<PipelineResult<String>>) -> Answerer {
        Answerer::new(
            generator.map(|r| Arc::new(Canned(r)) as Arc<dyn Generator>),
            AnswerParams::default(),
        )
    }

    #[tokio::test]
    async fn test_generated_answer_is_trimmed() {
        let a = answerer(Some(Ok("  Twelve percent.\n".to_string())))
            .answer("How much did revenue grow?", &passages(), "report.pdf")
            .await
            .unwrap();
        assert_eq!(a.mode, AnswerMode::Generated);
        assert_eq!(a.text, "Twelve percent.");
    }

    #[tokio::test]
    async fn test_falls_back_without_generator() {
        let a = answerer(None)
            .answer("revenue?", &passages(), "report.pdf")
            .await
            .unwrap();
        assert_eq!(a.mode, AnswerMode::Extracted);
        assert!(a.text.starts_with("Extracted passage from \"report.pdf\""));
        assert!(a.text.ends_with("Revenue grew by twelve percent in the third quarter."));
    }

    #[tokio::test]
    async fn test_falls_back_on_error_and_empty_output() {
        let failing = answerer(Some(Err(PipelineError::CapabilityUnavailable("timeout".into()))));
        let a = failing.answer("q", &passages(), "report.pdf").await.unwrap();
        assert_eq!(a.mode, AnswerMode::Extracted);

        let blank = answerer(Some(Ok("   ".to_string())));
        let a = blank.answer("q", &passages(), "report.pdf").await.unwrap();
        assert_eq!(a.mode, AnswerMode::Extracted);
    }

    #[tokio::test]
    async fn test_no_passages_is_an_error() {
        let err = answerer(None).answer("q", &[], "x").await.unwrap_err();
        assert_eq!(err.code(), "no_chunks");
    }

    #[test]
    fn test_prompt_lists_passages_in_rank_order() {
        let prompt = build_prompt("What about costs?", &passages(), 100);
        let first = prompt.user.find("[1] report.pdf (chunk 3)").unwrap();
        let second = prompt.user.find("[2] notes.txt (chunk 0)").unwrap();
        assert!(first < second);
        assert!(prompt.user.ends_with("Question: What about costs?"));
    }

    #[test]
    fn test_truncate_at_word_boundary() {
        assert_eq!(truncate_at_word("short text", 50), "short text");
        assert_eq!(truncate_at_word("alpha beta gamma delta", 13), "alpha beta...");
        assert_eq!(truncate_at_word("abcdefghij", 4), "abcd...");
    }
}
