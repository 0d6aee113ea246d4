use std::time::Duration;

use personarag_core::{PersonaError, PersonaResult};
use serde::{Deserialize, Serialize};

use crate::bm25::Bm25Params;
use crate::fusion::TieBreak;
use crate::hybrid::FusionParams;

/// Retrieval and fusion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Dense weight in `[0, 1]`; higher favours semantic similarity.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Candidates requested from the dense index.
    #[serde(default = "default_k_dense")]
    pub k_dense: usize,
    /// Candidates requested from the lexical index.
    #[serde(default = "default_k_bm25")]
    pub k_bm25: usize,
    /// Fused pool size handed to the reranker.
    #[serde(default = "default_top_cap")]
    pub top_cap: usize,
    /// Passages kept after reranking and sent to the generator.
    #[serde(default = "default_k_rerank")]
    pub k_rerank: usize,
    /// Order of fused candidates with equal scores.
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Budget for one dense query before falling back to lexical only.
    #[serde(default = "default_dense_timeout_ms")]
    pub dense_timeout_ms: u64,
    /// BM25 free parameters.
    #[serde(default)]
    pub bm25: Bm25Params,
}

fn default_alpha() -> f32 {
    0.65
}

fn default_k_dense() -> usize {
    50
}

fn default_k_bm25() -> usize {
    50
}

fn default_top_cap() -> usize {
    100
}

fn default_k_rerank() -> usize {
    8
}

fn default_dense_timeout_ms() -> u64 {
    5_000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            k_dense: default_k_dense(),
            k_bm25: default_k_bm25(),
            top_cap: default_top_cap(),
            k_rerank: default_k_rerank(),
            tie_break: TieBreak::default(),
            dense_timeout_ms: default_dense_timeout_ms(),
            bm25: Bm25Params::default(),
        }
    }
}

impl RetrievalConfig {
    /// Check weights and pool sizes.
    pub fn validate(&self) -> PersonaResult<()> {
        self.fusion_params()
            .validate()
            .map_err(|e| PersonaError::Config(format!("[retrieval] {e}")))?;
        if self.k_rerank == 0 {
            return Err(PersonaError::Config(
                "[retrieval] k_rerank must be positive".to_string(),
            ));
        }
        if self.dense_timeout_ms == 0 {
            return Err(PersonaError::Config(
                "[retrieval] dense_timeout_ms must be positive".to_string(),
            ));
        }
        self.bm25.validate()
    }

    /// Fusion parameters for a full-pool retrieval.
    pub fn fusion_params(&self) -> FusionParams {
        FusionParams {
            alpha: self.alpha,
            top_cap: self.top_cap,
            k_dense: self.k_dense,
            k_bm25: self.k_bm25,
            tie_break: self.tie_break,
        }
    }

    /// [`dense_timeout_ms`](Self::dense_timeout_ms) as a duration.
    pub fn dense_timeout(&self) -> Duration {
        Duration::from_millis(self.dense_timeout_ms)
    }
}

/// Which [`Reranker`](crate::rerank::Reranker) to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerKind {
    /// Keep the fused order.
    #[default]
    Identity,
    /// Re-score with an independent relevance model.
    Scored,
}

/// Reranker selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Which reranker to build.
    #[serde(default)]
    pub kind: RerankerKind,
}

/// Thresholds of the faithfulness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Sentences with fewer tokens are not judged.
    #[serde(default = "default_min_sentence_tokens")]
    pub min_sentence_tokens: usize,
    /// Fraction of sentence tokens that must appear in the context.
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f32,
}

fn default_min_sentence_tokens() -> usize {
    6
}

fn default_overlap_threshold() -> f32 {
    0.4
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            min_sentence_tokens: default_min_sentence_tokens(),
            overlap_threshold: default_overlap_threshold(),
        }
    }
}

impl VerifierConfig {
    /// Check the overlap threshold range.
    pub fn validate(&self) -> PersonaResult<()> {
        if !(0.0..=1.0).contains(&self.overlap_threshold) {
            return Err(PersonaError::Config(format!(
                "[verifier] overlap_threshold must be in [0, 1], got {}",
                self.overlap_threshold
            )));
        }
        if self.min_sentence_tokens == 0 {
            return Err(PersonaError::Config(
                "[verifier] min_sentence_tokens must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the answer generation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Budget for one generation call.
    #[serde(default = "default_generation_timeout_ms")]
    pub timeout_ms: u64,
    /// Person the assistant answers questions about.
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_generation_timeout_ms() -> u64 {
    30_000
}

fn default_subject() -> String {
    "the profile owner".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_generation_timeout_ms(),
            subject: default_subject(),
        }
    }
}

impl GenerationConfig {
    /// Check the timeout and subject.
    pub fn validate(&self) -> PersonaResult<()> {
        if self.timeout_ms == 0 {
            return Err(PersonaError::Config(
                "[generation] timeout_ms must be positive".to_string(),
            ));
        }
        if self.subject.trim().is_empty() {
            return Err(PersonaError::Config(
                "[generation] subject must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// [`timeout_ms`](Self::timeout_ms) as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Everything a [`RetrievalService`](crate::service::RetrievalService) is
/// configured with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// `[retrieval]` table.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// `[rerank]` table.
    #[serde(default)]
    pub rerank: RerankerConfig,
    /// `[verifier]` table.
    #[serde(default)]
    pub verifier: VerifierConfig,
    /// `[generation]` table.
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl ServiceConfig {
    pub fn validate(&self) -> PersonaResult<()> {
        self.retrieval.validate()?;
        self.verifier.validate()?;
        self.generation.validate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RetrievalConfig::default().validate().is_ok());
        assert!(VerifierConfig::default().validate().is_ok());
        assert!(GenerationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RetrievalConfig =
            serde_json::from_str(r#"{"alpha": 0.3, "tie_break": "key_order"}"#).unwrap();
        assert_eq!(config.alpha, 0.3);
        assert_eq!(config.tie_break, TieBreak::KeyOrder);
        assert_eq!(config.k_dense, 50);
        assert_eq!(config.k_rerank, 8);
        assert_eq!(config.bm25, Bm25Params::default());
        assert_eq!(config.dense_timeout(), Duration::from_secs(5));

        let reranker: RerankerConfig = serde_json::from_str(r#"{"kind": "scored"}"#).unwrap();
        assert_eq!(reranker.kind, RerankerKind::Scored);
    }

    #[test]
    fn test_invalid_retrieval_is_config_error() {
        let bad_alpha = RetrievalConfig {
            alpha: 2.0,
            ..RetrievalConfig::default()
        };
        let err = bad_alpha.validate().unwrap_err();
        assert!(matches!(err, PersonaError::Config(_)));
        assert!(err.to_string().contains("alpha"));

        let zero_rerank = RetrievalConfig {
            k_rerank: 0,
            ..RetrievalConfig::default()
        };
        assert!(zero_rerank.validate().is_err());

        let bad_bm25 = RetrievalConfig {
            bm25: Bm25Params { k1: 1.5, b: 3.0 },
            ..RetrievalConfig::default()
        };
        assert!(bad_bm25.validate().is_err());
    }

    #[test]
    fn test_invalid_verifier_and_generation() {
        let verifier = VerifierConfig {
            overlap_threshold: 1.2,
            ..VerifierConfig::default()
        };
        assert!(verifier.validate().is_err());

        let generation = GenerationConfig {
            subject: "  ".into(),
            ..GenerationConfig::default()
        };
        assert!(generation.validate().is_err());
    }

    #[test]
    fn test_service_config_sections() {
        let config: ServiceConfig = serde_json::from_str(
            r#"{"retrieval": {"k_rerank": 4}, "verifier": {"overlap_threshold": 0.5}}"#,
        )
        .unwrap();
        assert_eq!(config.retrieval.k_rerank, 4);
        assert_eq!(config.verifier.overlap_threshold, 0.5);
        assert_eq!(config.rerank.kind, RerankerKind::Identity);
        assert!(config.validate().is_ok());

        let mut bad = config;
        bad.generation.timeout_ms = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_fusion_params_mirror_config() {
        let config = RetrievalConfig::default();
        let params = config.fusion_params();
        assert_eq!(params, FusionParams::default());
    }
}
