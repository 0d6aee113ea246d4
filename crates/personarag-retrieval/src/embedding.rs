use async_trait::async_trait;
use personarag_core::{PersonaError, PersonaResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::verifier::tokenize;

/// Turns text into fixed-length vectors for the dense index.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Blank text is an [`PersonaError::InvalidArgument`].
    async fn embed(&self, text: &str) -> PersonaResult<Vec<f32>>;

    /// Embed several texts, in order. Providers backed by a remote model
    /// should override this with a single request.
    async fn embed_batch(&self, texts: &[&str]) -> PersonaResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;
}

/// Weight of an adjacent word pair relative to a single word.
const BIGRAM_WEIGHT: f32 = 0.5;

/// Feature-hashed embedding computed in process.
///
/// Text is tokenized the way the verifier does it (lower-cased,
/// alphanumeric runs). Every word and every adjacent word pair is hashed
/// with SHA-256 into one of `dimension` buckets, weighted `1 + ln(count)`,
/// and the vector is L2-normalized. Word pairs let "machine learning" and
/// "learning machine" differ a little. No model download, fully
/// deterministic across processes and platforms.
#[derive(Debug, Clone)]
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// `dimension` is clamped to at least 1.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> usize {
        let digest = Sha256::digest(feature.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(prefix) % self.dimension as u64) as usize
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

fn features(tokens: &[String]) -> HashMap<String, f32> {
    let mut counts: HashMap<String, f32> = HashMap::new();
    for token in tokens {
        *counts.entry(token.clone()).or_default() += 1.0;
    }
    for pair in tokens.windows(2) {
        *counts.entry(format!("{} {}", pair[0], pair[1])).or_default() += BIGRAM_WEIGHT;
    }
    counts
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> PersonaResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(PersonaError::InvalidArgument(
                "cannot embed blank text".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (feature, count) in features(&tokenize(text)) {
            // sublinear so a repeated word cannot dominate the chunk
            let weight = if count >= 1.0 { 1.0 + count.ln() } else { count };
            vector[self.bucket(&feature)] += weight;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Cosine of the angle between `a` and `b`.
///
/// Returns 0.0 when the lengths differ or either vector is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
