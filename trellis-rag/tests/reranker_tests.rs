//! Property and scenario tests for multi-signal reranking.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use proptest::prelude::*;
use trellis_rag::config::RerankerConfig;
use trellis_rag::document::{
    Chunk, ChunkKind, ChunkPayload, RelevanceSource, RetrievalCandidate, RetrievalMethod,
};
use trellis_rag::error::{RagError, Result};
use trellis_rag::relevance::RelevanceScorer;
use trellis_rag::reranker::MultiSignalReranker;

/// Scorer that replays a fixed sequence of scores.
struct SequenceScorer {
    scores: Mutex<VecDeque<f32>>,
}

impl SequenceScorer {
    fn new(scores: Vec<f32>) -> Self {
        Self { scores: Mutex::new(scores.into_iter().collect()) }
    }
}

#[async_trait]
impl RelevanceScorer for SequenceScorer {
    async fn score(&self, _query: &str, _content: &str, _kind: ChunkKind) -> Result<f32> {
        Ok(self.scores.lock().unwrap().pop_front().unwrap_or(0.5))
    }
}

/// Scorer that always fails.
struct FailingScorer;

#[async_trait]
impl RelevanceScorer for FailingScorer {
    async fn score(&self, _query: &str, _content: &str, _kind: ChunkKind) -> Result<f32> {
        Err(RagError::ScorerError {
            scorer: "test".to_string(),
            message: "model offline".to_string(),
        })
    }
}

fn candidate(
    id: &str,
    source_document: &str,
    section_id: &str,
    payload: ChunkPayload,
    similarity: f32,
) -> RetrievalCandidate {
    RetrievalCandidate {
        chunk: Chunk::new(id, section_id, source_document, payload),
        similarity_score: similarity,
        retrieval_method: RetrievalMethod::VectorSimilarity,
    }
}

fn text_candidate(id: &str, source_document: &str, similarity: f32) -> RetrievalCandidate {
    candidate(
        id,
        source_document,
        &format!("{id}_section"),
        ChunkPayload::Text { body: format!("body of {id}") },
        similarity,
    )
}

/// Generate candidates of mixed kinds, each from its own document and
/// section so no diversity penalty applies.
fn arb_distinct_candidates() -> impl Strategy<Value = Vec<RetrievalCandidate>> {
    proptest::collection::vec((0usize..3, 0.0f32..=1.0f32), 1..20).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (kind, similarity))| {
                let payload = match kind {
                    0 => ChunkPayload::Text { body: format!("text body {i}") },
                    1 => ChunkPayload::Image {
                        summary: format!("image summary {i}"),
                        image_type: "general".to_string(),
                    },
                    _ => ChunkPayload::Table {
                        table_name: format!("table_{i}"),
                        schema_sql: format!("CREATE TABLE table_{i} (id INT)"),
                    },
                };
                candidate(
                    &format!("doc_{i}_chunk_1"),
                    &format!("doc_{i}"),
                    &format!("Section_{i}"),
                    payload,
                    similarity,
                )
            })
            .collect()
    })
}

/// **Property 1: Degraded ordering**
/// *For any* candidates from distinct documents and sections, reranking
/// without a relevance scorer SHALL keep every relevance score equal to
/// its weighted score (marked as fallback), order results by
/// non-increasing weighted score, and return at most `top_k` of them.
mod prop_degraded_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(150))]

        #[test]
        fn fallback_preserves_weighted_order(
            candidates in arb_distinct_candidates(),
            top_k in 1usize..25,
        ) {
            let total = candidates.len();
            let rt = tokio::runtime::Runtime::new().unwrap();
            let ranked = rt.block_on(async {
                let reranker = MultiSignalReranker::new(RerankerConfig::default(), None);
                reranker.rerank("query", candidates, top_k).await
            });

            prop_assert_eq!(ranked.len(), top_k.min(total));

            for candidate in &ranked {
                prop_assert_eq!(candidate.relevance_source, RelevanceSource::Fallback);
                prop_assert_eq!(candidate.llm_relevance_score, candidate.weighted_score);
                prop_assert!(candidate.mmr_score.is_finite());
                prop_assert!(candidate.final_score.is_finite());
            }

            for window in ranked.windows(2) {
                prop_assert!(
                    window[0].weighted_score >= window[1].weighted_score,
                    "weighted order not preserved: {} < {}",
                    window[0].weighted_score,
                    window[1].weighted_score,
                );
                prop_assert!(window[0].final_score >= window[1].final_score);
            }
        }
    }
}

/// **Property 2: Score bounds**
/// *For any* raw scorer outputs, every scored candidate SHALL carry a
/// relevance score clamped to [0.0, 1.0], every fallback candidate SHALL
/// keep its weighted score, and diversity and final scores SHALL be
/// finite, ordered by non-increasing final score.
mod prop_score_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(150))]

        #[test]
        fn scores_clamped_and_finite(
            candidates in arb_distinct_candidates(),
            raw_scores in proptest::collection::vec(-10.0f32..10.0f32, 20),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let ranked = rt.block_on(async {
                let scorer = std::sync::Arc::new(SequenceScorer::new(raw_scores));
                let reranker = MultiSignalReranker::new(RerankerConfig::default(), Some(scorer));
                reranker.rerank("query", candidates, 25).await
            });

            for candidate in &ranked {
                match candidate.relevance_source {
                    RelevanceSource::Scored => prop_assert!(
                        (0.0..=1.0).contains(&candidate.llm_relevance_score),
                        "scored relevance out of bounds: {}",
                        candidate.llm_relevance_score,
                    ),
                    RelevanceSource::Fallback => prop_assert_eq!(
                        candidate.llm_relevance_score,
                        candidate.weighted_score,
                    ),
                }
                prop_assert!(candidate.mmr_score.is_finite());
                prop_assert!(candidate.final_score.is_finite());
            }

            for window in ranked.windows(2) {
                prop_assert!(window[0].final_score >= window[1].final_score);
            }
        }
    }
}

#[tokio::test]
async fn type_weighting_reorders_kinds() {
    let candidates = vec![
        candidate(
            "text_1",
            "doc_a",
            "Section_1",
            ChunkPayload::Text { body: "prose".to_string() },
            0.80,
        ),
        candidate(
            "image_1",
            "doc_b",
            "Section_2",
            ChunkPayload::Image {
                summary: "a chart".to_string(),
                image_type: "visualization".to_string(),
            },
            0.85,
        ),
        candidate(
            "table_1",
            "doc_c",
            "Section_3",
            ChunkPayload::Table {
                table_name: "sales".to_string(),
                schema_sql: "CREATE TABLE sales (id INT)".to_string(),
            },
            0.70,
        ),
    ];
    let reranker = MultiSignalReranker::new(RerankerConfig::default(), None);

    let ranked = reranker.rerank("query", candidates, 5).await;

    // raw order was image > text > table; weighting flips it
    let ids: Vec<&str> = ranked.iter().map(|c| c.chunk.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["text_1", "table_1", "image_1"]);
    assert!((ranked[0].weighted_score - 0.80).abs() < 1e-6);
    assert!((ranked[1].weighted_score - 0.77).abs() < 1e-6);
    assert!((ranked[2].weighted_score - 0.765).abs() < 1e-6);
}

#[tokio::test]
async fn repeated_source_ranks_below_fresh_source_at_equal_relevance() {
    // two chunks from doc_x, one from doc_y; the scorer ties the second
    // doc_x chunk with the doc_y chunk
    let candidates = vec![
        text_candidate("lead", "doc_x", 0.95),
        text_candidate("repeat", "doc_x", 0.90),
        text_candidate("fresh", "doc_y", 0.90),
    ];
    let scorer = std::sync::Arc::new(SequenceScorer::new(vec![0.95, 0.90, 0.90]));
    let reranker = MultiSignalReranker::new(RerankerConfig::default(), Some(scorer));

    let ranked = reranker.rerank("query", candidates, 5).await;

    let ids: Vec<&str> = ranked.iter().map(|c| c.chunk.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["lead", "fresh", "repeat"]);

    let of = |id: &str| ranked.iter().find(|c| c.chunk.chunk_id == id).unwrap();
    assert!(of("fresh").mmr_score > of("repeat").mmr_score);
}

#[tokio::test]
async fn scorer_failure_falls_back_to_weighted_scores() {
    let candidates = vec![
        text_candidate("a", "doc_a", 0.9),
        text_candidate("b", "doc_b", 0.6),
        text_candidate("c", "doc_c", 0.3),
    ];
    let reranker =
        MultiSignalReranker::new(RerankerConfig::default(), Some(std::sync::Arc::new(FailingScorer)));

    let ranked = reranker.rerank("query", candidates, 5).await;

    assert_eq!(ranked.len(), 3);
    for candidate in &ranked {
        assert_eq!(candidate.relevance_source, RelevanceSource::Fallback);
        assert_eq!(candidate.llm_relevance_score, candidate.weighted_score);
    }
    let ids: Vec<&str> = ranked.iter().map(|c| c.chunk.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn candidates_beyond_scoring_batch_keep_weighted_scores() {
    let config = RerankerConfig::builder().scoring_batch_limit(2).build().unwrap();
    let candidates = vec![
        text_candidate("first", "doc_a", 0.9),
        text_candidate("second", "doc_b", 0.8),
        text_candidate("third", "doc_c", 0.1),
    ];
    let scorer = std::sync::Arc::new(SequenceScorer::new(vec![0.99, 0.98]));
    let reranker = MultiSignalReranker::new(config, Some(scorer));

    let ranked = reranker.rerank("query", candidates, 5).await;

    let of = |id: &str| ranked.iter().find(|c| c.chunk.chunk_id == id).unwrap();
    assert_eq!(of("first").relevance_source, RelevanceSource::Scored);
    assert_eq!(of("second").relevance_source, RelevanceSource::Scored);
    assert_eq!(of("third").relevance_source, RelevanceSource::Fallback);
    assert_eq!(of("third").llm_relevance_score, of("third").weighted_score);
}

#[tokio::test]
async fn out_of_range_scores_are_clamped() {
    let candidates = vec![text_candidate("a", "doc_a", 0.5)];
    let scorer = std::sync::Arc::new(SequenceScorer::new(vec![1.7]));
    let reranker = MultiSignalReranker::new(RerankerConfig::default(), Some(scorer));

    let ranked = reranker.rerank("query", candidates, 5).await;

    assert_eq!(ranked[0].relevance_source, RelevanceSource::Scored);
    assert_eq!(ranked[0].llm_relevance_score, 1.0);
}

#[tokio::test]
async fn non_finite_scores_fall_back() {
    let candidates = vec![text_candidate("a", "doc_a", 0.5)];
    let scorer = std::sync::Arc::new(SequenceScorer::new(vec![f32::NAN]));
    let reranker = MultiSignalReranker::new(RerankerConfig::default(), Some(scorer));

    let ranked = reranker.rerank("query", candidates, 5).await;

    assert_eq!(ranked[0].relevance_source, RelevanceSource::Fallback);
    assert_eq!(ranked[0].llm_relevance_score, ranked[0].weighted_score);
}

#[tokio::test]
async fn empty_candidates_yield_empty_ranking() {
    let reranker = MultiSignalReranker::new(RerankerConfig::default(), None);
    let ranked = reranker.rerank("query", Vec::new(), 5).await;
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn results_truncated_to_top_k() {
    let candidates = vec![
        text_candidate("a", "doc_a", 0.9),
        text_candidate("b", "doc_b", 0.6),
        text_candidate("c", "doc_c", 0.3),
    ];
    let reranker = MultiSignalReranker::new(RerankerConfig::default(), None);

    let ranked = reranker.rerank("query", candidates, 1).await;

    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].chunk.chunk_id, "a");
}
