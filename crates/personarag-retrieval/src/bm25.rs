use personarag_core::{Candidate, CandidateMeta, CorpusChunk, PersonaError, PersonaResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::query_expansion::{QueryExpander, RuleBasedExpander};

/// BM25 free parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f32,
    /// Length normalization strength, in `[0, 1]`.
    #[serde(default = "default_b")]
    pub b: f32,
}

fn default_k1() -> f32 {
    1.5
}

fn default_b() -> f32 {
    0.75
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
        }
    }
}

impl Bm25Params {
    /// Reject parameters that would produce negative or undefined scores.
    pub fn validate(&self) -> PersonaResult<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(PersonaError::Config(format!(
                "bm25.k1 must be a non-negative number, got {}",
                self.k1
            )));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(PersonaError::Config(format!(
                "bm25.b must be in [0, 1], got {}",
                self.b
            )));
        }
        Ok(())
    }
}

/// Lower-case and split on whitespace. No stemming, no stop words.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Immutable BM25 index over the whole corpus.
///
/// Built once; queries never mutate it. To pick up a new corpus build a
/// fresh index and swap it in through
/// [`SharedIndexes`](crate::indexes::SharedIndexes).
#[derive(Clone)]
pub struct LexicalIndex {
    chunks: Vec<CorpusChunk>,
    /// term -> (chunk position, term frequency)
    inverted_index: HashMap<String, Vec<(usize, f32)>>,
    /// chunk position -> token count
    doc_lengths: Vec<f32>,
    avg_doc_length: f32,
    params: Bm25Params,
    expander: Arc<dyn QueryExpander>,
}

impl LexicalIndex {
    /// Build an index with default BM25 parameters and the built-in expander.
    pub fn new(chunks: Vec<CorpusChunk>) -> Self {
        Self::with_config(
            chunks,
            Bm25Params::default(),
            Arc::new(RuleBasedExpander::new()),
        )
    }

    /// Build an index with explicit parameters and query expander.
    pub fn with_config(
        chunks: Vec<CorpusChunk>,
        params: Bm25Params,
        expander: Arc<dyn QueryExpander>,
    ) -> Self {
        let mut inverted_index: HashMap<String, Vec<(usize, f32)>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(chunks.len());

        for (position, chunk) in chunks.iter().enumerate() {
            let tokens = tokenize(&chunk.content);
            doc_lengths.push(tokens.len() as f32);

            let mut term_freq: HashMap<String, f32> = HashMap::new();
            for token in tokens {
                *term_freq.entry(token).or_insert(0.0) += 1.0;
            }
            for (term, freq) in term_freq {
                inverted_index
                    .entry(term)
                    .or_default()
                    .push((position, freq));
            }
        }

        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<f32>() / doc_lengths.len() as f32
        };

        debug!(
            chunks = chunks.len(),
            terms = inverted_index.len(),
            avg_doc_length,
            "Built BM25 index"
        );
        Self {
            chunks,
            inverted_index,
            doc_lengths,
            avg_doc_length,
            params,
            expander,
        }
    }

    /// Score every chunk against the expanded `query`.
    ///
    /// The returned vector is indexed by corpus position. Uses:
    /// ```text
    /// score = sum over query tokens t of:
    ///   IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
    /// ```
    /// with `IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1.0)`, which stays
    /// positive even for terms present in most chunks. This is not the
    /// classic Okapi idf `ln((N - df + 0.5) / (df + 0.5))` with an epsilon
    /// floor: under Okapi a term found in more than half the chunks scores
    /// near zero or at the floor, here it still adds a small positive
    /// amount, so rankings can differ for very common terms. Repeated query
    /// tokens contribute once per occurrence.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let expanded = self.expander.expand(query);
        self.score_tokens(&tokenize(&expanded))
    }

    fn score_tokens(&self, query_tokens: &[String]) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.chunks.len()];
        if self.chunks.is_empty() {
            return scores;
        }

        let n = self.chunks.len() as f32;
        let avgdl = if self.avg_doc_length > 0.0 {
            self.avg_doc_length
        } else {
            1.0
        };
        let Bm25Params { k1, b } = self.params;

        for token in query_tokens {
            let Some(postings) = self.inverted_index.get(token) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for &(position, tf) in postings {
                let dl = self.doc_lengths[position];
                let numerator = tf * (k1 + 1.0);
                let denominator = tf + k1 * (1.0 - b + b * dl / avgdl);
                scores[position] += idf * numerator / denominator;
            }
        }

        scores
    }

    /// Return the `top_k` best chunks for `query`, best first.
    ///
    /// The query is expanded before tokenizing. Every chunk is ranked, so
    /// zero-score chunks fill the list when fewer than `top_k` match.
    /// Chunks with equal scores keep their corpus insertion order. The raw
    /// score is attached as `meta.bm25_score`.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<Candidate> {
        if self.chunks.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let scores = self.scores(query);
        let mut ranked: Vec<usize> = (0..self.chunks.len()).collect();
        // `sort_by` is stable: ties stay in insertion order.
        ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|position| {
                let chunk = &self.chunks[position];
                let meta = CandidateMeta {
                    bm25_score: Some(scores[position]),
                    ..CandidateMeta::for_chunk(chunk)
                };
                Candidate::new(chunk.content.clone(), meta)
            })
            .collect()
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.inverted_index.len()
    }

    /// The indexed chunks, in insertion order.
    pub fn chunks(&self) -> &[CorpusChunk] {
        &self.chunks
    }

    /// The BM25 parameters this index scores with.
    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// The expander applied to every query.
    pub fn expander(&self) -> Arc<dyn QueryExpander> {
        Arc::clone(&self.expander)
    }
}

impl fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("chunks", &self.chunks.len())
            .field("terms", &self.inverted_index.len())
            .field("avg_doc_length", &self.avg_doc_length)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
