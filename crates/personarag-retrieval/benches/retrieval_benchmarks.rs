//! Criterion benchmarks for BM25 retrieval and score fusion.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use personarag_core::{Candidate, CandidateMeta, CorpusChunk};
use personarag_retrieval::{fuse, LexicalIndex, TieBreak};

const VOCABULARY: [&str; 16] = [
    "rust", "python", "search", "engine", "distributed", "systems", "kubernetes", "university",
    "projects", "email", "github", "experience", "compiler", "latency", "ranking", "vector",
];

/// Deterministic synthetic corpus: chunk `i` cycles through the vocabulary.
fn synthetic_corpus(size: usize) -> Vec<CorpusChunk> {
    (0..size)
        .map(|i| {
            let content = (0..24)
                .map(|j| VOCABULARY[(i * 7 + j * 3) % VOCABULARY.len()])
                .collect::<Vec<_>>()
                .join(" ");
            CorpusChunk {
                chunk_id: i as u64,
                section: format!("resume::experience[{}]", i % 10),
                source: "bench".to_string(),
                content,
            }
        })
        .collect()
}

fn bench_bm25(c: &mut Criterion) {
    let index = LexicalIndex::new(synthetic_corpus(2_000));

    c.bench_function("bm25_retrieve_2k_chunks_top50", |b| {
        b.iter(|| index.retrieve(black_box("what rust projects and experience"), 50));
    });

    c.bench_function("bm25_build_2k_chunks", |b| {
        b.iter(|| LexicalIndex::new(black_box(synthetic_corpus(2_000))));
    });
}

fn bench_fusion(c: &mut Criterion) {
    let dense: Vec<Candidate> = (0..50u64)
        .map(|i| {
            Candidate::new(
                format!("chunk {i}"),
                CandidateMeta {
                    chunk_id: Some(i * 2),
                    dense_score: Some(1.0 - i as f32 / 50.0),
                    ..CandidateMeta::default()
                },
            )
        })
        .collect();
    let lexical: Vec<Candidate> = (0..50u64)
        .map(|i| {
            Candidate::new(
                format!("chunk {i}"),
                CandidateMeta {
                    chunk_id: Some(i * 3),
                    bm25_score: Some(20.0 - i as f32 * 0.3),
                    ..CandidateMeta::default()
                },
            )
        })
        .collect();

    c.bench_function("fuse_50_plus_50", |b| {
        b.iter(|| {
            fuse(
                black_box(&dense),
                black_box(&lexical),
                0.65,
                100,
                TieBreak::DenseFirst,
            )
        });
    });
}

criterion_group!(benches, bench_bm25, bench_fusion);
criterion_main!(benches);
