//! Core types and error definitions for the PersonaRAG retrieval engine.
//!
//! This crate provides the foundational types shared across all PersonaRAG
//! crates: the error enum, the corpus and candidate data model, and the
//! value objects exchanged with the generation collaborator.
//!
//! # Main types
//!
//! - [`PersonaError`]: Unified error enum, split into fatal startup failures
//!   and recoverable per-request degradations.
//! - [`PersonaResult`]: Convenience alias for `Result<T, PersonaError>`.
//! - [`CorpusChunk`]: Immutable retrieval unit produced by ingestion.
//! - [`Candidate`]: A retrieval result with typed [`CandidateMeta`].
//! - [`FusedCandidate`]: A candidate carrying its fused `hybrid_score`.
//! - [`VerificationResult`]: Outcome of a faithfulness check.

/// Context blocks, citations and verification results.
pub mod grounding;

pub use grounding::{Citation, ContextBlock, GeneratedAnswer, VerificationResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- Error types ---

/// Top-level error type for PersonaRAG.
///
/// Variants fall into two groups that callers must treat differently:
/// fatal startup failures ([`PersonaError::is_fatal`]) and recoverable
/// per-request degradations ([`PersonaError::is_recoverable`]).
#[derive(Debug, thiserror::Error)]
pub enum PersonaError {
    /// Invalid or inconsistent configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// The corpus is missing, unreadable, or malformed.
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// A caller supplied an out-of-range argument (alpha, top_cap, k).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The dense index collaborator failed.
    #[error("Dense retrieval error: {0}")]
    Dense(String),

    /// A collaborator did not answer before its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The generation collaborator failed.
    #[error("Generation error: {0}")]
    Generation(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PersonaError {
    /// Whether this error must abort startup instead of a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Corpus(_) | Self::Io(_))
    }

    /// Whether a request can proceed in degraded mode after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Dense(_) | Self::Timeout(_))
    }
}

/// A convenience `Result` alias using [`PersonaError`].
pub type PersonaResult<T> = Result<T, PersonaError>;

// --- Corpus types ---

/// One record of the chunk docstore, produced by ingestion.
///
/// Read-only once an index has been built over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusChunk {
    /// Identifier, unique within the corpus.
    pub chunk_id: u64,
    /// Section label, e.g. `resume::experience[0]`.
    #[serde(default)]
    pub section: String,
    /// Origin of the chunk (file name or source id).
    #[serde(default)]
    pub source: String,
    /// Chunk text.
    pub content: String,
}

// --- Candidate types ---

/// Typed metadata attached to a retrieval candidate.
///
/// Known fields are explicit; anything else a dense backend reports lands
/// in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateMeta {
    /// Section label of the originating chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Source id of the originating chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Chunk identifier, when the backend knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<u64>,
    /// Raw similarity from the dense index (higher is better).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f32>,
    /// Raw BM25 score from the lexical index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bm25_score: Option<f32>,
    /// Fused score in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f32>,
    /// Score assigned by a scoring reranker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    /// Open-ended backend metadata.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CandidateMeta {
    /// Metadata describing a corpus chunk, without any score.
    pub fn for_chunk(chunk: &CorpusChunk) -> Self {
        Self {
            section: Some(chunk.section.clone()),
            source: Some(chunk.source.clone()),
            chunk_id: Some(chunk.chunk_id),
            ..Self::default()
        }
    }

    /// Fill descriptive fields that are unset here from `other`.
    ///
    /// Fields already present win. Score fields are never touched.
    pub fn fill_missing_from(&mut self, other: &CandidateMeta) {
        if self.section.is_none() {
            self.section.clone_from(&other.section);
        }
        if self.source.is_none() {
            self.source.clone_from(&other.source);
        }
        if self.chunk_id.is_none() {
            self.chunk_id = other.chunk_id;
        }
        for (key, value) in &other.extra {
            self.extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// A single retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Passage text.
    pub content: String,
    /// Provenance and scores.
    #[serde(default)]
    pub meta: CandidateMeta,
}

impl Candidate {
    /// Creates a candidate from raw content and metadata.
    pub fn new(content: impl Into<String>, meta: CandidateMeta) -> Self {
        Self {
            content: content.into(),
            meta,
        }
    }

    /// Creates an unscored candidate describing a corpus chunk.
    pub fn from_chunk(chunk: &CorpusChunk) -> Self {
        Self::new(chunk.content.clone(), CandidateMeta::for_chunk(chunk))
    }
}

/// A candidate produced by fusion.
///
/// `meta.hybrid_score` always mirrors `hybrid_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    /// Passage text.
    pub content: String,
    /// Union of the dense and lexical metadata.
    pub meta: CandidateMeta,
    /// Weighted fusion of the normalized per-source scores.
    pub hybrid_score: f32,
}

impl FusedCandidate {
    /// Creates a fused candidate and records the score in its metadata.
    pub fn new(content: impl Into<String>, mut meta: CandidateMeta, hybrid_score: f32) -> Self {
        meta.hybrid_score = Some(hybrid_score);
        Self {
            content: content.into(),
            meta,
            hybrid_score,
        }
    }
}

impl From<FusedCandidate> for Candidate {
    fn from(fused: FusedCandidate) -> Self {
        Candidate {
            content: fused.content,
            meta: fused.meta,
        }
    }
}
