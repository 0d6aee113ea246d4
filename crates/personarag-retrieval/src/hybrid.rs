use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use personarag_core::{Candidate, FusedCandidate, PersonaError, PersonaResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bm25::LexicalIndex;
use crate::dense::DenseIndexClient;
use crate::fusion::{fuse, TieBreak};
use crate::indexes::{CorpusIndexes, SharedIndexes};

/// Default deadline for one dense index call.
pub const DEFAULT_DENSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-call fusion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionParams {
    /// Weight of the dense side: 1.0 = pure dense, 0.0 = pure lexical.
    pub alpha: f32,
    /// Maximum number of fused candidates returned.
    pub top_cap: usize,
    /// Candidates requested from the dense index.
    pub k_dense: usize,
    /// Candidates requested from the lexical index.
    pub k_bm25: usize,
    /// Order of candidates with equal fused scores.
    pub tie_break: TieBreak,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            alpha: 0.65,
            top_cap: 100,
            k_dense: 50,
            k_bm25: 50,
            tie_break: TieBreak::DenseFirst,
        }
    }
}

impl FusionParams {
    /// Default candidate pool sizes with the given weight and cap.
    pub fn new(alpha: f32, top_cap: usize) -> Self {
        Self {
            alpha,
            top_cap,
            ..Self::default()
        }
    }

    /// Chainable tie-break override.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Reject out-of-range values with [`PersonaError::InvalidArgument`].
    pub fn validate(&self) -> PersonaResult<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(PersonaError::InvalidArgument(format!(
                "alpha must be in [0, 1], got {}",
                self.alpha
            )));
        }
        if self.top_cap == 0 {
            return Err(PersonaError::InvalidArgument(
                "top_cap must be positive".to_string(),
            ));
        }
        if self.k_dense == 0 || self.k_bm25 == 0 {
            return Err(PersonaError::InvalidArgument(format!(
                "k_dense and k_bm25 must be positive, got {} and {}",
                self.k_dense, self.k_bm25
            )));
        }
        Ok(())
    }
}

/// Why a fusion result was produced from fewer sources than requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// The dense index returned an error.
    DenseFailed { reason: String },
    /// The dense index missed its deadline.
    DenseTimedOut { after_ms: u64 },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DenseFailed { reason } => write!(f, "dense retrieval failed: {reason}"),
            Self::DenseTimedOut { after_ms } => {
                write!(f, "dense retrieval timed out after {after_ms}ms")
            }
        }
    }
}

/// Output of [`HybridRetriever::retrieve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResults {
    /// Ranked candidates, best first.
    pub candidates: Vec<FusedCandidate>,
    /// Set when the dense side was dropped for this query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation: Option<Degradation>,
}

impl FusedResults {
    /// Whether the dense side was dropped.
    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }
}

/// Runs the dense and lexical retrievers for a query and fuses their
/// results with min-max normalized weighted scoring.
///
/// The lexical side always answers. The dense side is bounded by a
/// timeout; if it fails or times out the query continues lexical-only and
/// the result carries a [`Degradation`]. Both sides are read from the same
/// [`CorpusIndexes`] snapshot.
#[derive(Clone)]
pub struct HybridRetriever {
    indexes: SharedIndexes,
    dense_timeout: Duration,
}

impl HybridRetriever {
    /// Serve `lexical` and `dense` as the first index generation.
    pub fn new(dense: Arc<dyn DenseIndexClient>, lexical: LexicalIndex) -> Self {
        Self::from_shared(SharedIndexes::new(CorpusIndexes::new(lexical, dense)))
    }

    /// Serve an existing index handle.
    pub fn from_shared(indexes: SharedIndexes) -> Self {
        Self {
            indexes,
            dense_timeout: DEFAULT_DENSE_TIMEOUT,
        }
    }

    /// Set the dense call deadline. Chainable builder method.
    pub fn with_dense_timeout(mut self, timeout: Duration) -> Self {
        self.dense_timeout = timeout;
        self
    }

    /// Handle to the live indexes, for reloads.
    pub fn indexes(&self) -> &SharedIndexes {
        &self.indexes
    }

    /// Deadline applied to every dense call.
    pub fn dense_timeout(&self) -> Duration {
        self.dense_timeout
    }

    /// Retrieve from both sources and fuse.
    ///
    /// Only invalid `params` produce an error. Both sources are queried
    /// concurrently against one snapshot of the indexes.
    pub async fn retrieve(
        &self,
        query: &str,
        params: &FusionParams,
    ) -> PersonaResult<FusedResults> {
        params.validate()?;

        let snapshot = self.indexes.current();
        let lexical_search = async { snapshot.lexical.retrieve(query, params.k_bm25) };
        let ((dense, degradation), lexical) = tokio::join!(
            self.dense_or_degrade(snapshot.dense.as_ref(), query, params.k_dense),
            lexical_search
        );

        debug!(
            dense = dense.len(),
            lexical = lexical.len(),
            degraded = degradation.is_some(),
            "Collected hybrid candidates"
        );

        let candidates = fuse(
            &dense,
            &lexical,
            params.alpha,
            params.top_cap,
            params.tie_break,
        );
        Ok(FusedResults {
            candidates,
            degradation,
        })
    }

    /// Dense results alone, best first. Errors and timeouts propagate.
    pub async fn dense_only(&self, query: &str, k: usize) -> PersonaResult<Vec<Candidate>> {
        let dense = Arc::clone(&self.indexes.current().dense);
        let hits = tokio::time::timeout(self.dense_timeout, dense.top_k(query, k))
            .await
            .map_err(|_| {
                PersonaError::Timeout(format!(
                    "dense index did not answer within {}ms",
                    self.dense_timeout.as_millis()
                ))
            })??;
        Ok(hits.into_iter().map(Candidate::from).collect())
    }

    /// Lexical results alone, best first.
    pub fn lexical_only(&self, query: &str, k: usize) -> Vec<Candidate> {
        self.indexes.current().lexical.retrieve(query, k)
    }

    async fn dense_or_degrade(
        &self,
        dense: &dyn DenseIndexClient,
        query: &str,
        k: usize,
    ) -> (Vec<Candidate>, Option<Degradation>) {
        match tokio::time::timeout(self.dense_timeout, dense.top_k(query, k)).await {
            Ok(Ok(hits)) => (hits.into_iter().map(Candidate::from).collect(), None),
            Ok(Err(e)) => {
                warn!(error = %e, "Dense retrieval failed, continuing lexical-only");
                (
                    Vec::new(),
                    Some(Degradation::DenseFailed {
                        reason: e.to_string(),
                    }),
                )
            }
            Err(_) => {
                let after_ms = u64::try_from(self.dense_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(
                    timeout_ms = after_ms,
                    "Dense retrieval timed out, continuing lexical-only"
                );
                (Vec::new(), Some(Degradation::DenseTimedOut { after_ms }))
            }
        }
    }
}

impl fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("indexes", &self.indexes.current())
            .field("dense_timeout", &self.dense_timeout)
            .finish()
    }
}
