//! Multi-signal reranking.
//!
//! Candidates flow through four stages: kind weighting, external relevance
//! scoring of the top batch, a diversity adjustment over source documents
//! and sections, and a weighted fusion of all three signals. Every stage
//! records its score on the candidate, so the final ordering stays
//! attributable.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::RerankerConfig;
use crate::document::{RankedCandidate, RelevanceSource, RetrievalCandidate};
use crate::error::Result;
use crate::relevance::RelevanceScorer;

/// How much of a candidate's content is sent to the relevance scorer.
const MAX_SCORED_CONTENT_CHARS: usize = 500;

/// An external reranker that replaces the internal scoring stages.
///
/// Implementations call a hosted cross-encoder and map its relevance
/// scores into final scores. A failure here must surface as an error; the
/// pipeline then falls back to the internal [`MultiSignalReranker`], so a
/// broken external service never fails a query.
#[async_trait]
pub trait CrossEncoderReranker: Send + Sync {
    /// Reranks `candidates` against `query`, returning at most `top_k`
    /// results ordered by descending final score.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RetrievalCandidate],
        top_k: usize,
    ) -> Result<Vec<RankedCandidate>>;
}

/// Reranks retrieval candidates with kind weights, scored relevance,
/// diversity, and fusion.
///
/// The reranker itself is infallible: scorer failures degrade the affected
/// candidates to their weighted retrieval score (visible as
/// [`RelevanceSource::Fallback`]) and an empty candidate list yields an
/// empty ranking.
pub struct MultiSignalReranker {
    config: RerankerConfig,
    scorer: Option<Arc<dyn RelevanceScorer>>,
}

impl MultiSignalReranker {
    /// Creates a reranker from a validated config and an optional scorer.
    ///
    /// Without a scorer every candidate keeps its weighted score as its
    /// relevance score.
    pub fn new(config: RerankerConfig, scorer: Option<Arc<dyn RelevanceScorer>>) -> Self {
        Self { config, scorer }
    }

    /// Reranks `candidates` against `query`, returning at most `top_k`
    /// results ordered by descending final score.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalCandidate>,
        top_k: usize,
    ) -> Vec<RankedCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut ranked = self.apply_type_weights(candidates);
        self.score_top_batch(query, &mut ranked).await;
        self.apply_diversity(&mut ranked);
        self.fuse_scores(&mut ranked);

        ranked.truncate(top_k);
        ranked
    }

    /// Stage one: weight retrieval scores by chunk kind and sort.
    fn apply_type_weights(&self, candidates: Vec<RetrievalCandidate>) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let weight = self.config.weight_for(candidate.chunk.kind());
                RankedCandidate::from_candidate(candidate, weight)
            })
            .collect();
        sort_desc_by(&mut ranked, |c| c.weighted_score);
        debug!(count = ranked.len(), "applied type weights");
        ranked
    }

    /// Stage two: score the top batch with the relevance scorer.
    ///
    /// Calls run one at a time in descending weighted-score order, so an
    /// interrupted batch still leaves every candidate with a usable score.
    /// Candidates beyond the batch keep their weighted score.
    async fn score_top_batch(&self, query: &str, ranked: &mut [RankedCandidate]) {
        let Some(scorer) = &self.scorer else {
            debug!("no relevance scorer configured, keeping weighted scores");
            return;
        };

        let batch = self.config.scoring_batch_limit.min(ranked.len());
        for candidate in ranked.iter_mut().take(batch) {
            let content: String = candidate
                .chunk
                .content()
                .chars()
                .take(MAX_SCORED_CONTENT_CHARS)
                .collect();
            match scorer.score(query, &content, candidate.chunk.kind()).await {
                Ok(score) if score.is_finite() => {
                    candidate.llm_relevance_score = score.clamp(0.0, 1.0);
                    candidate.relevance_source = RelevanceSource::Scored;
                }
                Ok(score) => {
                    warn!(
                        chunk_id = %candidate.chunk.chunk_id,
                        score,
                        "non-finite relevance score, falling back to weighted score"
                    );
                }
                Err(e) => {
                    warn!(
                        chunk_id = %candidate.chunk.chunk_id,
                        error = %e,
                        "relevance scoring failed, falling back to weighted score"
                    );
                }
            }
        }
        debug!(batch, total = ranked.len(), "scored top candidates");
    }

    /// Stage three: penalize repeats of already-seen sources and sections.
    ///
    /// Candidates are visited in descending relevance order. The first
    /// chunk from a source document pays no penalty; later chunks from the
    /// same source pay 0.2, and later chunks from an already-seen section
    /// a further 0.1. The adjusted score is
    /// `lambda * relevance - (1 - lambda) * penalty`.
    fn apply_diversity(&self, ranked: &mut [RankedCandidate]) {
        let lambda = self.config.mmr_lambda;
        let mut seen_sources: HashSet<String> = HashSet::new();
        let mut seen_sections: HashSet<String> = HashSet::new();

        sort_desc_by(ranked, |c| c.llm_relevance_score);

        for candidate in ranked.iter_mut() {
            let mut penalty = 0.0;
            if seen_sources.contains(&candidate.chunk.source_document) {
                penalty += 0.2;
            }
            if seen_sections.contains(&candidate.chunk.section_id) {
                penalty += 0.1;
            }

            candidate.mmr_score = lambda * candidate.llm_relevance_score - (1.0 - lambda) * penalty;

            seen_sources.insert(candidate.chunk.source_document.clone());
            seen_sections.insert(candidate.chunk.section_id.clone());
        }

        sort_desc_by(ranked, |c| c.mmr_score);
        debug!(
            sources = seen_sources.len(),
            sections = seen_sections.len(),
            "applied diversity adjustment"
        );
    }

    /// Stage four: fuse the three signals into the final score and sort.
    fn fuse_scores(&self, ranked: &mut [RankedCandidate]) {
        for candidate in ranked.iter_mut() {
            candidate.final_score = self.config.fusion_weighted * candidate.weighted_score
                + self.config.fusion_llm * candidate.llm_relevance_score
                + self.config.fusion_mmr * candidate.mmr_score;
        }
        sort_desc_by(ranked, |c| c.final_score);
    }
}

/// Stable descending sort by a float key. Ties keep their prior order.
fn sort_desc_by<F>(candidates: &mut [RankedCandidate], key: F)
where
    F: Fn(&RankedCandidate) -> f32,
{
    candidates.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(std::cmp::Ordering::Equal));
}
