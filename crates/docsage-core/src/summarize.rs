//! Document summarization.
//!
//! The generative path asks the configured [`Generator`] for a summary of a
//! capped prefix of the document. Without a generator, or when it fails, an
//! extractive summary is built locally:
//!
//! 1. Split the text into sentences.
//! 2. Count non-stopword lowercase words and normalize by the top count.
//! 3. Score each sentence as the sum of its words' normalized frequencies.
//! 4. Keep the `N` best sentences (ties go to the earlier one) and emit them
//!    in their original order.
//!
//! # Example
//!
//! ```rust
//! use docsage_core::summarize::extractive_summary;
//!
//! let text = "A cat sat. The cat ate fish. Fish are tasty. Cats like fish.";
//! assert_eq!(extractive_summary(text, 2), "The cat ate fish. Cats like fish.");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::generate::{Generator, Prompt};
use crate::models::SummaryMode;

#[derive(Debug, Clone, Copy)]
pub struct SummaryParams {
    /// Characters of document text sent to the generator.
    pub max_input_chars: usize,
    /// Word budget given to the generator.
    pub max_words: usize,
    pub min_sentences: usize,
    pub max_sentences: usize,
    /// Share of sentences kept by the extractive path.
    pub sentence_ratio: f64,
    pub max_tokens: u32,
}

impl Default for SummaryParams {
    fn default() -> Self {
        Self {
            max_input_chars: 12_000,
            max_words: 300,
            min_sentences: 3,
            max_sentences: 10,
            sentence_ratio: 0.2,
            max_tokens: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub text: String,
    pub mode: SummaryMode,
}

pub struct Summarizer {
    generator: Option<Arc<dyn Generator>>,
    params: SummaryParams,
}

impl Summarizer {
    pub fn new(generator: Option<Arc<dyn Generator>>, params: SummaryParams) -> Self {
        Self { generator, params }
    }

    /// Summarize a document's full text.
    pub async fn summarize(&self, text: &str) -> PipelineResult<Summary> {
        let sentence_count = split_sentences(text).len();
        if sentence_count == 0 {
            return Err(PipelineError::EmptyDocument);
        }

        if let Some(generator) = &self.generator {
            let prompt = build_prompt(text, &self.params);
            match generator.generate(&prompt).await {
                Ok(out) if !out.trim().is_empty() => {
                    return Ok(Summary {
                        text: out.trim().to_string(),
                        mode: SummaryMode::Generated,
                    });
                }
                Ok(_) => {
                    tracing::warn!(generator = generator.name(), "empty summary, using extractive fallback");
                }
                Err(e) => {
                    tracing::warn!(generator = generator.name(), error = %e, "summary generation failed, using extractive fallback");
                }
            }
        }

        let n = sentence_budget(sentence_count, &self.params);
        Ok(Summary {
            text: extractive_summary(text, n),
            mode: SummaryMode::Extractive,
        })
    }
}

/// Number of sentences the extractive path keeps for a document of `count`
/// sentences.
pub fn sentence_budget(count: usize, params: &SummaryParams) -> usize {
    let wanted = (count as f64 * params.sentence_ratio).ceil() as usize;
    wanted
        .max(params.min_sentences)
        .min(params.max_sentences)
        .min(count)
}

fn build_prompt(text: &str, params: &SummaryParams) -> Prompt {
    let capped: String = if text.chars().count() > params.max_input_chars {
        let mut head: String = text.chars().take(params.max_input_chars).collect();
        head.push_str("...");
        head
    } else {
        text.to_string()
    };
    Prompt {
        system: "You write concise, faithful summaries of documents.".to_string(),
        user: format!(
            "Summarize the following document in at most {} words. \
             Write the summary in the same language as the document.\n\n{}",
            params.max_words, capped
        ),
        max_tokens: params.max_tokens,
    }
}

/// Pick the `n` highest-scoring sentences of `text` and join them in
/// original order.
pub fn extractive_summary(text: &str, n: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.is_empty() || n == 0 {
        return String::new();
    }

    let tokenized: Vec<Vec<String>> = sentences.iter().map(|s| content_words(s)).collect();

    let mut freq: HashMap<&str, usize> = HashMap::new();
    for words in &tokenized {
        for w in words {
            *freq.entry(w.as_str()).or_insert(0) += 1;
        }
    }
    let top = freq.values().copied().max().unwrap_or(1) as f64;

    let scores: Vec<f64> = tokenized
        .iter()
        .map(|words| words.iter().map(|w| freq[w.as_str()] as f64 / top).sum())
        .collect();

    let mut order: Vec<usize> = (0..sentences.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let mut keep: Vec<usize> = order.into_iter().take(n).collect();
    keep.sort_unstable();

    keep.iter()
        .map(|&i| sentences[i])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split text into trimmed sentences.
///
/// A sentence ends at terminal punctuation followed by whitespace, at a
/// blank line, or at the end of the text.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        let next = iter.peek().map(|&(_, n)| n);
        let boundary = match c {
            '.' | '!' | '?' | '。' | '！' | '？' => next.map_or(true, char::is_whitespace),
            '\n' => next == Some('\n'),
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            push_sentence(&mut out, &text[start..end]);
            start = end;
        }
    }
    push_sentence(&mut out, &text[start..]);
    out
}

fn push_sentence<'a>(out: &mut Vec<&'a str>, piece: &'a str) {
    let s = piece.trim();
    if s.chars().any(char::is_alphanumeric) {
        out.push(s);
    }
}

fn content_words(sentence: &str) -> Vec<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty() && !is_stopword(w))
        .collect()
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Sorted for binary search.
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "it's", "its", "itself",
    "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on",
    "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same",
    "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        reply: PipelineResult<String>,
        seen: Mutex<Vec<Prompt>>,
    }

    #[async_trait]
    impl Generator for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, prompt: &Prompt) -> PipelineResult<String> {
            self.seen.lock().unwrap().push(prompt.clone());
            self.reply.clone()
        }
    }

    #[test]
    fn test_stopwords_sorted() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn test_extractive_keeps_original_order() {
        let text = "A cat sat. The cat ate fish. Fish are tasty. Cats like fish.";
        assert_eq!(extractive_summary(text, 2), "The cat ate fish. Cats like fish.");
    }

    #[test]
    fn test_best_sentence_last_stays_last() {
        let text = "Dogs bark. Birds sing. Rain falls. Cats purr while cats nap near other cats.";
        assert_eq!(
            extractive_summary(text, 1),
            "Cats purr while cats nap near other cats."
        );
        let two = extractive_summary(text, 2);
        assert!(two.ends_with("Cats purr while cats nap near other cats."));
        assert!(two.starts_with("Dogs bark."));
    }

    #[test]
    fn test_ties_prefer_earlier_sentences() {
        let text = "Red apples. Green pears. Blue plums.";
        assert_eq!(extractive_summary(text, 2), "Red apples. Green pears.");
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("First one. Second? Third!\n\nHeading without stop\n\nv1.2 is out. ");
        assert_eq!(
            s,
            vec!["First one.", "Second?", "Third!", "Heading without stop", "v1.2 is out."]
        );
    }

    #[test]
    fn test_sentence_budget_clamps() {
        let p = SummaryParams::default();
        assert_eq!(sentence_budget(2, &p), 2);
        assert_eq!(sentence_budget(10, &p), 3);
        assert_eq!(sentence_budget(21, &p), 5);
        assert_eq!(sentence_budget(500, &p), 10);
    }

    #[tokio::test]
    async fn test_empty_document_rejected() {
        let s = Summarizer::new(None, SummaryParams::default());
        assert_eq!(s.summarize("   \n ").await.unwrap_err(), PipelineError::EmptyDocument);
    }

    #[tokio::test]
    async fn test_punctuation_only_document_rejected() {
        let s = Summarizer::new(None, SummaryParams::default());
        assert_eq!(
            s.summarize("--- *** ---\n\n=== ...").await.unwrap_err(),
            PipelineError::EmptyDocument
        );
    }

    #[tokio::test]
    async fn test_extractive_without_generator() {
        let s = Summarizer::new(None, SummaryParams::default());
        let out = s
            .summarize("One fact here. Another fact there. A third fact.")
            .await
            .unwrap();
        assert_eq!(out.mode, SummaryMode::Extractive);
        assert_eq!(out.text, "One fact here. Another fact there. A third fact.");
    }

    #[tokio::test]
    async fn test_generator_receives_capped_text() {
        let gen = Arc::new(Recording {
            reply: Ok(" Short summary. ".to_string()),
            seen: Mutex::new(Vec::new()),
        });
        let params = SummaryParams {
            max_input_chars: 20,
            ..SummaryParams::default()
        };
        let s = Summarizer::new(Some(gen.clone() as Arc<dyn Generator>), params);
        let out = s.summarize(&"word ".repeat(50)).await.unwrap();
        assert_eq!(out.mode, SummaryMode::Generated);
        assert_eq!(out.text, "Short summary.");

        let seen = gen.seen.lock().unwrap();
        assert!(seen[0].user.ends_with("word word word word ..."));
        assert!(seen[0].user.contains("at most 300 words"));
        assert!(seen[0].user.contains("same language"));
    }

    #[tokio::test]
    async fn test_generator_failure_falls_back() {
        let gen = Arc::new(Recording {
            reply: Err(PipelineError::CapabilityUnavailable("down".into())),
            seen: Mutex::new(Vec::new()),
        });
        let s = Summarizer::new(Some(gen as Arc<dyn Generator>), SummaryParams::default());
        let out = s.summarize("Only sentence here.").await.unwrap();
        assert_eq!(out.mode, SummaryMode::Extractive);
        assert_eq!(out.text, "Only sentence here.");
    }
}
