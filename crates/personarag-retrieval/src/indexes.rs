//! The live pair of corpus indexes and its swap-on-reload handle.
//!
//! The lexical index and a docstore-derived dense index are one
//! generation: they are built from the same chunks and replaced together,
//! so a query never fuses text from two versions of the corpus.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use personarag_core::{CorpusChunk, PersonaResult};
use tracing::info;

use crate::bm25::LexicalIndex;
use crate::corpus::load_corpus;
use crate::dense::DenseIndexClient;

/// One generation of the corpus indexes.
#[derive(Clone)]
pub struct CorpusIndexes {
    /// BM25 index over the generation's chunks.
    pub lexical: Arc<LexicalIndex>,
    /// Dense index; either built from the same chunks or external.
    pub dense: Arc<dyn DenseIndexClient>,
}

impl CorpusIndexes {
    /// Pair a lexical index with a dense client.
    pub fn new(lexical: LexicalIndex, dense: Arc<dyn DenseIndexClient>) -> Self {
        Self {
            lexical: Arc::new(lexical),
            dense,
        }
    }
}

impl fmt::Debug for CorpusIndexes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorpusIndexes")
            .field("lexical", &self.lexical)
            .finish_non_exhaustive()
    }
}

/// Double-buffered handle to the live [`CorpusIndexes`].
///
/// Queries take a snapshot with [`current`](Self::current) and read both
/// indexes from it, even if a swap happens mid-request. Rebuilds run
/// off-lock and are serialized against each other; only the pointer swap
/// takes the write lock.
#[derive(Debug, Clone)]
pub struct SharedIndexes {
    live: Arc<RwLock<Arc<CorpusIndexes>>>,
    rebuild: Arc<tokio::sync::Mutex<()>>,
}

impl SharedIndexes {
    /// Start serving `indexes`.
    pub fn new(indexes: CorpusIndexes) -> Self {
        Self {
            live: Arc::new(RwLock::new(Arc::new(indexes))),
            rebuild: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Snapshot of the generation currently serving queries.
    pub fn current(&self) -> Arc<CorpusIndexes> {
        Arc::clone(&self.live.read())
    }

    /// Replace the live generation, returning the retired one.
    pub fn swap(&self, indexes: CorpusIndexes) -> Arc<CorpusIndexes> {
        let next = Arc::new(indexes);
        let chunks = next.lexical.len();
        let next_dense = next.dense.chunk_count();
        let previous = std::mem::replace(&mut *self.live.write(), next);
        info!(
            chunks,
            dense_chunks = ?next_dense,
            previous_chunks = previous.lexical.len(),
            "Swapped corpus indexes"
        );
        previous
    }

    /// Build the next generation from `chunks` and swap it in.
    ///
    /// The lexical index keeps the live parameters and expander. The dense
    /// index is rebuilt when it derives from the docstore; an external one
    /// is carried over. Nothing is swapped if any build fails.
    pub async fn rebuild_from(&self, chunks: Vec<CorpusChunk>) -> PersonaResult<usize> {
        let _maintenance = self.rebuild.lock().await;
        let live = self.current();

        let dense = match live.dense.rebuild(&chunks).await? {
            Some(dense) => dense,
            None => {
                info!("Dense index is external, keeping it across the reload");
                Arc::clone(&live.dense)
            }
        };
        let lexical = LexicalIndex::with_config(
            chunks,
            live.lexical.params(),
            live.lexical.expander(),
        );

        let count = lexical.len();
        self.swap(CorpusIndexes::new(lexical, dense));
        Ok(count)
    }

    /// Read the docstore at `path` once and rebuild from it.
    ///
    /// On error the previous generation keeps serving.
    pub async fn reload(&self, path: &Path) -> PersonaResult<usize> {
        let chunks = load_corpus(path).await?;
        self.rebuild_from(chunks).await
    }
}
