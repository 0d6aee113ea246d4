//! Contract with the answer generator, plus prompt and context assembly.
//!
//! The generator itself (usually a hosted LLM) lives outside this crate.
//! [`ExtractiveGenerator`] is a local stand-in that quotes the retrieved
//! passages, so the pipeline runs end to end without network access.

use async_trait::async_trait;
use chrono::NaiveDate;
use personarag_core::{Citation, ContextBlock, FusedCandidate, GeneratedAnswer, PersonaResult};
use std::fmt::Write as _;

/// Produces a grounded answer from a question and numbered context.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        contexts: &[ContextBlock],
    ) -> PersonaResult<GeneratedAnswer>;
}

/// Number the final candidates from 1, in order.
pub fn build_context(candidates: &[FusedCandidate]) -> Vec<ContextBlock> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| ContextBlock::from_fused(i + 1, candidate))
        .collect()
}

/// One citation per context block, in block order.
pub fn citations_for(contexts: &[ContextBlock]) -> Vec<Citation> {
    contexts.iter().map(ContextBlock::citation).collect()
}

/// Render the grounded-answer prompt.
///
/// Each block gets a `[i] source: <source> | section: <section>` header;
/// the section part is omitted when unknown and the source falls back to
/// `unknown`.
pub fn build_prompt(
    question: &str,
    contexts: &[ContextBlock],
    subject: &str,
    date: NaiveDate,
) -> String {
    let context_text = contexts
        .iter()
        .map(|block| {
            let mut header = format!(
                "[{}] source: {}",
                block.index,
                block.source.as_deref().unwrap_or("unknown")
            );
            if let Some(section) = block.section.as_deref().filter(|s| !s.is_empty()) {
                let _ = write!(header, " | section: {section}");
            }
            format!("{header}\n{}", block.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a personal AI assistant for {subject} that answers questions about \
{subject}'s background, work experience, projects, skills, and certifications.

Use ONLY the information in the CONTEXT below. If the context does not contain the answer, say you don't know.

QUESTION:
{question}

CONTEXT:
{context_text}

INSTRUCTIONS:
- Answer concisely in natural language.
- Combine information from multiple snippets if needed.
- Do NOT invent facts that are not supported by the context.
- If something is unclear or missing, say that it's not available.
- Cite snippets by their [number].
- If a snippet contains a link, write it as a clickable link.
- Current date: {date}
Now provide your answer.
",
        date = date.format("%B %d, %Y"),
    )
}

/// Answers by quoting the first sentence of each of the top passages.
///
/// Deterministic and offline. Useful for evaluation runs and for exercising
/// the pipeline when no model endpoint is configured.
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    max_passages: usize,
}

impl ExtractiveGenerator {
    /// Answer from at most `max_passages` passages.
    pub fn new(max_passages: usize) -> Self {
        Self {
            max_passages: max_passages.max(1),
        }
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    match text.find(['.', '!', '?']) {
        Some(end) => &text[..=end],
        None => text,
    }
}

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    async fn generate(
        &self,
        _question: &str,
        contexts: &[ContextBlock],
    ) -> PersonaResult<GeneratedAnswer> {
        let used: Vec<&ContextBlock> = contexts
            .iter()
            .filter(|c| !c.content.trim().is_empty())
            .take(self.max_passages)
            .collect();

        if used.is_empty() {
            return Ok(GeneratedAnswer {
                answer: "I don't know based on the available information.".to_string(),
                citations: Vec::new(),
            });
        }

        let answer = used
            .iter()
            .map(|c| {
                let sentence = first_sentence(&c.content);
                let sentence = sentence.trim_end_matches(['.', '!', '?']);
                format!("{sentence} [{}].", c.index)
            })
            .collect::<Vec<_>>()
            .join(" ");

        Ok(GeneratedAnswer {
            answer,
            citations: used.iter().map(|c| c.citation()).collect(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use personarag_core::CandidateMeta;

    fn fused(id: u64, content: &str, section: Option<&str>) -> FusedCandidate {
        FusedCandidate::new(
            content,
            CandidateMeta {
                chunk_id: Some(id),
                section: section.map(str::to_string),
                source: Some("resume.json".into()),
                ..CandidateMeta::default()
            },
            0.5,
        )
    }

    #[test]
    fn test_build_context_numbers_from_one() {
        let contexts = build_context(&[
            fused(7, "first", Some("skills")),
            fused(3, "second", None),
        ]);
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].index, 1);
        assert_eq!(contexts[0].chunk_id, Some(7));
        assert_eq!(contexts[1].index, 2);
        assert_eq!(contexts[1].section, None);
    }

    #[test]
    fn test_citations_follow_context_order() {
        let contexts = build_context(&[fused(7, "a", Some("skills")), fused(3, "b", None)]);
        let citations = citations_for(&contexts);
        assert_eq!(
            citations,
            vec![
                Citation {
                    index: 1,
                    section: Some("skills".into()),
                    chunk_id: Some(7)
                },
                Citation {
                    index: 2,
                    section: None,
                    chunk_id: Some(3)
                },
            ]
        );
    }

    #[test]
    fn test_prompt_headers_and_date() {
        let mut contexts = build_context(&[
            fused(1, "Worked at Acme as an engineer.", Some("resume::experience[0]")),
            fused(2, "Knows Rust.", None),
        ]);
        contexts[1].source = None;
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        let prompt = build_prompt("Where did you work?", &contexts, "Ada", date);

        assert!(prompt.contains("assistant for Ada"));
        assert!(prompt.contains("QUESTION:\nWhere did you work?"));
        assert!(prompt.contains(
            "[1] source: resume.json | section: resume::experience[0]\nWorked at Acme as an engineer."
        ));
        assert!(prompt.contains("[2] source: unknown\nKnows Rust."));
        assert!(prompt.contains("Current date: March 05, 2024"));
    }

    #[tokio::test]
    async fn test_extractive_generator_quotes_top_passages() {
        let contexts = build_context(&[
            fused(1, "I build search systems. Also other things.", None),
            fused(2, "   ", None),
            fused(3, "Rust is my main language", None),
        ]);
        let out = ExtractiveGenerator::new(2)
            .generate("q", &contexts)
            .await
            .unwrap();

        assert_eq!(out.answer, "I build search systems [1]. Rust is my main language [3].");
        let indices: Vec<usize> = out.citations.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_extractive_generator_without_context() {
        let out = ExtractiveGenerator::default().generate("q", &[]).await.unwrap();
        assert!(out.answer.contains("don't know"));
        assert!(out.citations.is_empty());
    }
}
