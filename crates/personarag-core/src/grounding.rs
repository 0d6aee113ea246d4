//! Types exchanged with the generation collaborator and the verifier.
//!
//! They live in `personarag-core` so that both the retrieval service and
//! any generator implementation can share them without depending on the
//! retrieval crate.

use serde::{Deserialize, Serialize};

use crate::{Candidate, CandidateMeta, FusedCandidate};

/// A numbered passage handed to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    /// 1-based position in the prompt, referenced by citations.
    pub index: usize,
    /// Passage text.
    pub content: String,
    /// Section label of the originating chunk.
    #[serde(default)]
    pub section: Option<String>,
    /// Source id of the originating chunk.
    #[serde(default)]
    pub source: Option<String>,
    /// Chunk identifier, when known.
    #[serde(default)]
    pub chunk_id: Option<u64>,
}

impl ContextBlock {
    /// Builds the block at `index` from passage text and its metadata.
    pub fn new(index: usize, content: impl Into<String>, meta: &CandidateMeta) -> Self {
        Self {
            index,
            content: content.into(),
            section: meta.section.clone(),
            source: meta.source.clone(),
            chunk_id: meta.chunk_id,
        }
    }

    /// Builds the block at `index` from a retrieval candidate.
    pub fn from_candidate(index: usize, candidate: &Candidate) -> Self {
        Self::new(index, candidate.content.as_str(), &candidate.meta)
    }

    /// Builds the block at `index` from a fused (possibly reranked) candidate.
    pub fn from_fused(index: usize, candidate: &FusedCandidate) -> Self {
        Self::new(index, candidate.content.as_str(), &candidate.meta)
    }

    /// Citation pointing at this block.
    pub fn citation(&self) -> Citation {
        Citation {
            index: self.index,
            section: self.section.clone(),
            chunk_id: self.chunk_id,
        }
    }
}

/// A reference from an answer back to a context block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Index of the cited [`ContextBlock`].
    pub index: usize,
    /// Section label of the cited block.
    pub section: Option<String>,
    /// Chunk identifier of the cited block, when known.
    pub chunk_id: Option<u64>,
}

/// What the generation collaborator returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    /// Answer text.
    pub answer: String,
    /// Blocks the answer draws on, in the order the generator cited them.
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// Outcome of a lexical faithfulness check.
///
/// `supported_sentences <= total_sentences` always holds; `total_sentences`
/// counts only sentences long enough to be judged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Fraction of judged sentences that are supported, in `[0, 1]`.
    pub support_rate: f32,
    /// Sentences long enough to be judged.
    pub total_sentences: usize,
    /// Judged sentences whose overlap with the context met the threshold.
    pub supported_sentences: usize,
}

impl VerificationResult {
    /// Result for an answer with no sentences at all.
    pub fn vacuous() -> Self {
        Self {
            support_rate: 1.0,
            total_sentences: 0,
            supported_sentences: 0,
        }
    }

    /// Result for an answer whose sentences were all too short to judge.
    pub fn undecided() -> Self {
        Self {
            support_rate: 0.5,
            total_sentences: 0,
            supported_sentences: 0,
        }
    }

    /// Result computed from judged sentence counts.
    ///
    /// `total` must be non-zero; use [`VerificationResult::undecided`] otherwise.
    pub fn from_counts(supported: usize, total: usize) -> Self {
        debug_assert!(total > 0 && supported <= total);
        Self {
            support_rate: supported as f32 / total as f32,
            total_sentences: total,
            supported_sentences: supported,
        }
    }
}
