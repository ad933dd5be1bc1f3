//! Cohere reranking client.
//!
//! This module is only available when the `cohere` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::document::{RankedCandidate, RelevanceSource, RetrievalCandidate};
use crate::error::{RagError, Result};
use crate::reranker::CrossEncoderReranker;

/// The default Cohere API base URL.
const COHERE_BASE_URL: &str = "https://api.cohere.com/v1";

/// The default reranking model.
const DEFAULT_RERANK_MODEL: &str = "rerank-english-v3.0";

/// A [`CrossEncoderReranker`] backed by the Cohere rerank API.
///
/// Candidates are sent as plain text documents; the returned relevance
/// scores become the final scores. Signals the external service does not
/// compute (type weights, diversity) stay at their neutral values, with
/// the relevance source marked [`RelevanceSource::Scored`].
///
/// Any failure surfaces as [`RagError::RerankerError`] so the pipeline can
/// fall back to its internal reranker.
pub struct CohereReranker {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl CohereReranker {
    /// Create a new reranker with the given API key.
    ///
    /// Uses the default model (`rerank-english-v3.0`).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::RerankerError {
                reranker: "Cohere".into(),
                message: "API key must not be empty".into(),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: COHERE_BASE_URL.into(),
            model: DEFAULT_RERANK_MODEL.into(),
        })
    }

    /// Create a new reranker using the `COHERE_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("COHERE_API_KEY").map_err(|_| RagError::RerankerError {
            reranker: "Cohere".into(),
            message: "COHERE_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different base URL (e.g. a proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

// ── API request/response types ─────────────────────────────────────

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    message: String,
}

#[async_trait]
impl CrossEncoderReranker for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RetrievalCandidate],
        top_k: usize,
    ) -> Result<Vec<RankedCandidate>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            reranker = "Cohere",
            model = %self.model,
            count = candidates.len(),
            top_k,
            "reranking candidates"
        );

        let request_body = RerankRequest {
            model: &self.model,
            query,
            documents: candidates.iter().map(|c| c.chunk.content()).collect(),
            top_n: top_k,
        };

        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(reranker = "Cohere", error = %e, "request failed");
                RagError::RerankerError {
                    reranker: "Cohere".into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);

            error!(reranker = "Cohere", %status, "API error");
            return Err(RagError::RerankerError {
                reranker: "Cohere".into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let rerank_response: RerankResponse = response.json().await.map_err(|e| {
            error!(reranker = "Cohere", error = %e, "failed to parse response");
            RagError::RerankerError {
                reranker: "Cohere".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        let mut ranked = Vec::with_capacity(rerank_response.results.len());
        for result in rerank_response.results {
            let candidate =
                candidates.get(result.index).ok_or_else(|| RagError::RerankerError {
                    reranker: "Cohere".into(),
                    message: format!("result index {} out of range", result.index),
                })?;
            let score = if result.relevance_score.is_finite() {
                result.relevance_score.clamp(0.0, 1.0)
            } else {
                0.0
            };

            ranked.push(RankedCandidate {
                chunk: candidate.chunk.clone(),
                similarity_score: candidate.similarity_score,
                retrieval_method: candidate.retrieval_method,
                type_weight: 1.0,
                weighted_score: candidate.similarity_score,
                llm_relevance_score: score,
                relevance_source: RelevanceSource::Scored,
                mmr_score: 0.0,
                final_score: score,
            });
        }

        ranked.sort_by(|a, b| {
            b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_k);
        Ok(ranked)
    }
}
