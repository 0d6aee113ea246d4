//! Score fusion of dense and lexical result lists.
//!
//! Everything here is a pure function of its inputs: no I/O, no clocks,
//! no randomness. [`fuse`] is the whole algorithm; the async plumbing that
//! gathers its inputs lives in [`crate::hybrid`].

use personarag_core::{Candidate, CandidateMeta, FusedCandidate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// Spread below which a source's scores count as all equal.
pub const NORMALIZE_EPSILON: f32 = 1e-9;

/// How candidates with equal `hybrid_score` are ordered.
///
/// The ranking sort is stable, so ties keep the order in which keys were
/// first seen while merging. This choice is arbitrary; it makes results
/// reproducible but says nothing about relevance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Merge dense results first, so dense-first candidates win ties.
    #[default]
    DenseFirst,
    /// Merge lexical results first, so lexical-first candidates win ties.
    LexicalFirst,
    /// Ascending lexicographic order of the candidate key.
    KeyOrder,
}

/// Stable identity of a candidate across sources.
///
/// `chunk:<id>` when the chunk id is known, otherwise `hash:` followed by
/// the first 8 bytes of the SHA-256 of the content, hex encoded.
pub fn candidate_key(candidate: &Candidate) -> String {
    match candidate.meta.chunk_id {
        Some(id) => format!("chunk:{id}"),
        None => {
            let digest = Sha256::digest(candidate.content.as_bytes());
            format!("hash:{}", hex::encode(&digest[..8]))
        }
    }
}

/// Min-max scale `scores` into `[0, 1]`.
///
/// If every score is equal (spread below [`NORMALIZE_EPSILON`]) each one maps
/// to `1.0`: a flat source is treated as uniformly relevant, not as
/// carrying no signal. Empty input yields empty output.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let Some(lo) = scores.iter().copied().reduce(f32::min) else {
        return Vec::new();
    };
    let hi = scores.iter().copied().reduce(f32::max).unwrap_or(lo);
    let spread = hi - lo;

    if spread < NORMALIZE_EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - lo) / spread).collect()
}

#[derive(Debug)]
struct Merged<'a> {
    key: String,
    dense: Option<&'a Candidate>,
    lexical: Option<&'a Candidate>,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Dense,
    Lexical,
}

/// Normalized scores for one source, aligned with `merged`; 0.0 where the
/// source has no (finite) score for a key.
fn normalized_column(merged: &[Merged<'_>], source: Source) -> Vec<f32> {
    let raw: Vec<(usize, f32)> = merged
        .iter()
        .enumerate()
        .filter_map(|(slot, m)| {
            let score = match source {
                Source::Dense => m.dense.and_then(|c| c.meta.dense_score),
                Source::Lexical => m.lexical.and_then(|c| c.meta.bm25_score),
            };
            score.filter(|s| s.is_finite()).map(|s| (slot, s))
        })
        .collect();

    let values: Vec<f32> = raw.iter().map(|&(_, s)| s).collect();
    let mut column = vec![0.0; merged.len()];
    for (&(slot, _), norm) in raw.iter().zip(min_max_normalize(&values)) {
        column[slot] = norm;
    }
    column
}

fn merged_meta(m: &Merged<'_>) -> (String, CandidateMeta) {
    let (content, mut meta) = match (m.dense, m.lexical) {
        (Some(dense), Some(lexical)) => {
            let mut meta = dense.meta.clone();
            meta.fill_missing_from(&lexical.meta);
            (dense.content.clone(), meta)
        }
        (Some(only), None) | (None, Some(only)) => (only.content.clone(), only.meta.clone()),
        (None, None) => (String::new(), CandidateMeta::default()),
    };
    meta.dense_score = m.dense.and_then(|c| c.meta.dense_score);
    meta.bm25_score = m.lexical.and_then(|c| c.meta.bm25_score);
    (content, meta)
}

/// Merge dense and lexical candidates into one ranked list.
///
/// 1. Candidates are keyed with [`candidate_key`]; the same key from both
///    sources becomes one entry carrying both `dense_score` and
///    `bm25_score`. Within one source the first occurrence of a key wins.
/// 2. Each source's scores are normalized independently with
///    [`min_max_normalize`]; a key missing from a source scores 0.0 there.
/// 3. `hybrid_score = alpha * dense + (1 - alpha) * lexical`.
/// 4. Entries are sorted by descending `hybrid_score` (ties per
///    `tie_break`) and truncated to `top_cap`.
///
/// Dense metadata wins on field collisions; lexical metadata only fills
/// gaps. Either input may be empty. `alpha` must already be validated to
/// lie in `[0, 1]`.
pub fn fuse(
    dense: &[Candidate],
    lexical: &[Candidate],
    alpha: f32,
    top_cap: usize,
    tie_break: TieBreak,
) -> Vec<FusedCandidate> {
    debug_assert!((0.0..=1.0).contains(&alpha), "alpha out of range: {alpha}");

    let merge_order: [(Source, &[Candidate]); 2] = match tie_break {
        TieBreak::LexicalFirst => [(Source::Lexical, lexical), (Source::Dense, dense)],
        TieBreak::DenseFirst | TieBreak::KeyOrder => {
            [(Source::Dense, dense), (Source::Lexical, lexical)]
        }
    };

    let mut merged: Vec<Merged<'_>> = Vec::with_capacity(dense.len() + lexical.len());
    let mut slots: HashMap<String, usize> = HashMap::new();

    for (source, candidates) in merge_order {
        for candidate in candidates {
            let key = candidate_key(candidate);
            let slot = *slots.entry(key.clone()).or_insert_with(|| {
                merged.push(Merged {
                    key,
                    dense: None,
                    lexical: None,
                });
                merged.len() - 1
            });
            let entry = &mut merged[slot];
            match source {
                Source::Dense => {
                    entry.dense.get_or_insert(candidate);
                }
                Source::Lexical => {
                    entry.lexical.get_or_insert(candidate);
                }
            }
        }
    }

    let dense_norm = normalized_column(&merged, Source::Dense);
    let lexical_norm = normalized_column(&merged, Source::Lexical);
    let scores: Vec<f32> = dense_norm
        .iter()
        .zip(&lexical_norm)
        .map(|(d, l)| (alpha * d + (1.0 - alpha) * l).clamp(0.0, 1.0))
        .collect();

    let mut ranked: Vec<usize> = (0..merged.len()).collect();
    if tie_break == TieBreak::KeyOrder {
        ranked.sort_by(|&a, &b| merged[a].key.cmp(&merged[b].key));
    }
    // Stable: equal scores keep the order established above.
    ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    ranked.truncate(top_cap);

    debug!(
        dense = dense.len(),
        lexical = lexical.len(),
        merged = merged.len(),
        returned = ranked.len(),
        alpha,
        "Fused candidate lists"
    );

    ranked
        .into_iter()
        .map(|slot| {
            let (content, meta) = merged_meta(&merged[slot]);
            FusedCandidate::new(content, meta, scores[slot])
        })
        .collect()
}
