//! Hybrid multi-modal retrieval.
//!
//! Text and image chunks are retrieved by vector similarity over their
//! embeddings; table chunks are retrieved by lexical term matching over
//! their name, query surface, and metadata. A failing store contributes an
//! empty result for its kind instead of failing the whole call; only a
//! failed query embedding is fatal.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::RetrieverConfig;
use crate::document::{Chunk, ChunkKind, RetrievalCandidate, RetrievalMethod};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::store::ChunkStore;

/// Retrieves candidates of every chunk kind for a query.
pub struct HybridRetriever {
    config: RetrieverConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ChunkStore>,
}

impl HybridRetriever {
    /// Creates a retriever from a validated config and its collaborators.
    pub fn new(
        config: RetrieverConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ChunkStore>,
    ) -> Self {
        Self { config, embedding_provider, store }
    }

    /// Retrieves up to `limit` candidates per chunk kind.
    ///
    /// The merged list is sorted by descending retrieval score. Scores from
    /// different retrieval paths are not directly comparable; the ordering
    /// is presentational and the reranker does not depend on it.
    ///
    /// # Errors
    ///
    /// Returns an error only when embedding the query fails. Store
    /// failures degrade to an empty contribution for the affected kind.
    pub async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievalCandidate>> {
        if query.trim().is_empty() {
            debug!("empty query, nothing to retrieve");
            return Ok(Vec::new());
        }

        let query_embedding = self.embedding_provider.embed(query).await?;

        let mut candidates = Vec::new();

        for kind in [ChunkKind::Text, ChunkKind::Image] {
            match self.store.vector_search(kind, &query_embedding, limit).await {
                Ok(results) => {
                    debug!(kind = %kind, count = results.len(), "vector search complete");
                    candidates.extend(results.into_iter().map(|(chunk, score)| {
                        RetrievalCandidate {
                            chunk,
                            similarity_score: sanitize_score(score),
                            retrieval_method: RetrievalMethod::VectorSimilarity,
                        }
                    }));
                }
                Err(e) => {
                    warn!(kind = %kind, error = %e, "vector search failed, skipping kind");
                }
            }
        }

        let terms = query_terms(query);
        if terms.is_empty() {
            debug!("no lexical terms in query, skipping table search");
        } else {
            match self.store.lexical_search(&terms, limit).await {
                Ok(matches) => {
                    debug!(count = matches.len(), "lexical search complete");
                    let mut table_candidates: Vec<RetrievalCandidate> = matches
                        .into_iter()
                        .map(|chunk| {
                            let score =
                                lexical_score(&chunk, &terms, self.config.lexical_norm_factor);
                            RetrievalCandidate {
                                chunk,
                                similarity_score: score,
                                retrieval_method: RetrievalMethod::KeywordMatching,
                            }
                        })
                        .collect();
                    sort_by_score(&mut table_candidates);
                    candidates.extend(table_candidates);
                }
                Err(e) => {
                    warn!(error = %e, "lexical search failed, skipping tables");
                }
            }
        }

        sort_by_score(&mut candidates);
        Ok(candidates)
    }
}

/// Lowercased whitespace-separated query terms. Repeated terms stay
/// repeated so their occurrences count more than once.
fn query_terms(query: &str) -> Vec<String> {
    query.to_lowercase().split_whitespace().map(str::to_string).collect()
}

/// Term-frequency score for a table chunk, saturating at 1.0 once each
/// term occurs `norm_factor` times on average.
fn lexical_score(chunk: &Chunk, terms: &[String], norm_factor: f32) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let surface = chunk.lexical_surface();
    let occurrences: usize =
        terms.iter().map(|term| surface.matches(term.as_str()).count()).sum();
    (occurrences as f32 / (terms.len() as f32 * norm_factor)).min(1.0)
}

fn sanitize_score(score: f32) -> f32 {
    if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 }
}

fn sort_by_score(candidates: &mut [RetrievalCandidate]) {
    candidates.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkPayload;

    fn table_chunk(table_name: &str, schema_sql: &str) -> Chunk {
        Chunk::new(
            "doc_chunk_1",
            "Section_1",
            "doc",
            ChunkPayload::Table {
                table_name: table_name.to_string(),
                schema_sql: schema_sql.to_string(),
            },
        )
    }

    #[test]
    fn lexical_score_saturates_at_one() {
        let chunk = table_chunk("sales sales sales sales", "sales sales sales sales sales");
        let terms = vec!["sales".to_string()];
        assert_eq!(lexical_score(&chunk, &terms, 3.0), 1.0);
    }

    #[test]
    fn lexical_score_counts_across_surface() {
        let chunk = table_chunk("quarterly_sales", "SELECT region FROM sales");
        let terms = vec!["sales".to_string()];
        // two occurrences, one term, factor 3 -> 2/3
        let score = lexical_score(&chunk, &terms, 3.0);
        assert!((score - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn unmatched_terms_score_zero() {
        let chunk = table_chunk("inventory", "SELECT sku FROM stock");
        let terms = vec!["revenue".to_string()];
        assert_eq!(lexical_score(&chunk, &terms, 3.0), 0.0);
    }

    #[test]
    fn sanitize_clamps_and_replaces_non_finite() {
        assert_eq!(sanitize_score(1.5), 1.0);
        assert_eq!(sanitize_score(-0.2), 0.0);
        assert_eq!(sanitize_score(f32::NAN), 0.0);
    }
}
