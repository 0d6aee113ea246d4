use std::collections::HashSet;
use std::sync::LazyLock;

use personarag_core::{ContextBlock, VerificationResult};
use regex::Regex;

use crate::config::VerifierConfig;

#[allow(clippy::expect_used)]
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("sentence regex is valid"));

#[allow(clippy::expect_used)]
static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("token regex is valid"));

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Lower-case, turn every run outside `[a-z0-9]` into a space, split.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&lowered, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Lexical faithfulness check of an answer against its context.
///
/// A sentence is supported when at least `overlap_threshold` of its tokens
/// (counted with repetition) occur anywhere in the context. Sentences
/// shorter than `min_sentence_tokens` are not judged at all. This measures
/// lexical support only; it cannot tell whether the answer is correct.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaithfulnessVerifier {
    min_sentence_tokens: usize,
    overlap_threshold: f32,
}

impl Default for FaithfulnessVerifier {
    fn default() -> Self {
        Self::from_config(&VerifierConfig::default())
    }
}

impl FaithfulnessVerifier {
    /// Verifier with explicit thresholds.
    pub fn new(min_sentence_tokens: usize, overlap_threshold: f32) -> Self {
        Self {
            min_sentence_tokens,
            overlap_threshold,
        }
    }

    /// Verifier with the configured thresholds.
    pub fn from_config(config: &VerifierConfig) -> Self {
        Self::new(config.min_sentence_tokens, config.overlap_threshold)
    }

    /// Verify `answer` against the content of `contexts`.
    pub fn verify(&self, answer: &str, contexts: &[ContextBlock]) -> VerificationResult {
        self.verify_texts(answer, contexts.iter().map(|c| c.content.as_str()))
    }

    /// Verify `answer` against raw context texts.
    ///
    /// - no sentences at all: support rate 1.0
    /// - only sentences too short to judge: 0.5
    /// - otherwise supported / judged; with no context tokens nothing is
    ///   supported
    pub fn verify_texts<I, S>(&self, answer: &str, contexts: I) -> VerificationResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let context_tokens: HashSet<String> = contexts
            .into_iter()
            .flat_map(|text| tokenize(text.as_ref()))
            .collect();

        let mut any_sentence = false;
        let mut total = 0;
        let mut supported = 0;

        for sentence in split_sentences(answer) {
            any_sentence = true;
            let tokens = tokenize(sentence);
            if tokens.len() < self.min_sentence_tokens || tokens.is_empty() {
                continue;
            }
            total += 1;
            if context_tokens.is_empty() {
                continue;
            }

            let hits = tokens
                .iter()
                .filter(|t| context_tokens.contains(t.as_str()))
                .count();
            let overlap = hits as f32 / tokens.len() as f32;
            if overlap >= self.overlap_threshold {
                supported += 1;
            }
        }

        match (any_sentence, total) {
            (false, _) => VerificationResult::vacuous(),
            (true, 0) => VerificationResult::undecided(),
            _ => VerificationResult::from_counts(supported, total),
        }
    }
}
