//! Retrieval pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the full ingest-and-query workflow by
//! composing a [`Chunker`], an [`EmbeddingProvider`], a [`ChunkStore`],
//! the [`HybridRetriever`], and the [`MultiSignalReranker`], with an
//! optional external [`CrossEncoderReranker`] in front of the internal
//! one.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_rag::{RagPipeline, PipelineConfig, InMemoryChunkStore};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(PipelineConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .store(Arc::new(InMemoryChunkStore::new()))
//!     .relevance_scorer(Arc::new(my_scorer))  // optional
//!     .build()?;
//!
//! pipeline.ingest(&markdown, "handbook.md").await?;
//! let ranked = pipeline.query("vacation policy", 5).await?;
//! ```

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chunking::{Chunker, HierarchicalChunker};
use crate::config::PipelineConfig;
use crate::document::{Chunk, RankedCandidate};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::relevance::RelevanceScorer;
use crate::reranker::{CrossEncoderReranker, MultiSignalReranker};
use crate::retriever::HybridRetriever;
use crate::store::ChunkStore;
use crate::tokenizer::{HeuristicTokenCounter, TokenCounter};

/// The retrieval pipeline orchestrator.
///
/// Coordinates document ingestion (chunk → embed → store), embedding
/// backfill, and query execution (retrieve → rerank). Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: PipelineConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ChunkStore>,
    chunker: Arc<dyn Chunker>,
    retriever: HybridRetriever,
    reranker: MultiSignalReranker,
    cross_encoder: Option<Arc<dyn CrossEncoderReranker>>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the chunk store.
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Ingest a markdown document: chunk → embed → store.
    ///
    /// Returns the chunks that were stored (with embeddings attached).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if chunking, embedding, or
    /// storage fails, including the document name in the error message.
    pub async fn ingest(&self, text: &str, source_document: &str) -> Result<Vec<Chunk>> {
        // 1. Chunk the document
        let mut chunks = self.chunker.chunk(text, source_document).map_err(|e| {
            error!(source_document = %source_document, error = %e, "chunking failed");
            RagError::PipelineError(format!("chunking failed for '{source_document}': {e}"))
        })?;
        if chunks.is_empty() {
            info!(source_document = %source_document, chunk_count = 0, "ingested document (empty)");
            return Ok(chunks);
        }

        // 2. Collect chunk contents for batch embedding
        let contents: Vec<String> = chunks.iter().map(|c| c.content()).collect();
        let content_refs: Vec<&str> = contents.iter().map(String::as_str).collect();

        // 3. Generate embeddings
        let embeddings = self.embedding_provider.embed_batch(&content_refs).await.map_err(|e| {
            error!(source_document = %source_document, error = %e, "embedding failed during ingestion");
            RagError::PipelineError(format!("embedding failed for '{source_document}': {e}"))
        })?;

        // 4. Attach embeddings to chunks
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }

        // 5. Upsert into the store
        self.store.upsert(&chunks).await.map_err(|e| {
            error!(source_document = %source_document, error = %e, "upsert failed during ingestion");
            RagError::PipelineError(format!("upsert failed for '{source_document}': {e}"))
        })?;

        let chunk_count = chunks.len();
        info!(source_document = %source_document, chunk_count, "ingested document");

        Ok(chunks)
    }

    /// Ingest chunks built outside the chunker, such as image chunks from
    /// a describer or table chunks from an analyzer.
    ///
    /// Chunks without embeddings can be filled in later with
    /// [`embed_missing`](RagPipeline::embed_missing).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if storage fails.
    pub async fn ingest_prechunked(&self, chunks: &[Chunk]) -> Result<()> {
        self.store.upsert(chunks).await.map_err(|e| {
            error!(error = %e, "upsert of prechunked chunks failed");
            RagError::PipelineError(format!("upsert of prechunked chunks failed: {e}"))
        })?;

        info!(chunk_count = chunks.len(), "ingested prechunked chunks");
        Ok(())
    }

    /// Embed every stored chunk that has no embedding yet.
    ///
    /// The pass is idempotent: chunks that already carry an embedding are
    /// never touched, so it can be re-run after a partial failure. A chunk
    /// whose embedding call fails is skipped and left for the next run.
    ///
    /// Returns the number of chunks embedded.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the store cannot list or
    /// persist chunks.
    pub async fn embed_missing(&self) -> Result<usize> {
        let pending = self.store.chunks_without_embedding().await.map_err(|e| {
            error!(error = %e, "failed to list chunks without embedding");
            RagError::PipelineError(format!("failed to list chunks without embedding: {e}"))
        })?;

        if pending.is_empty() {
            info!(embedded = 0, "no chunks need embedding");
            return Ok(0);
        }

        let mut embedded = 0;
        for mut chunk in pending {
            let content = chunk.content();
            match self.embedding_provider.embed(&content).await {
                Ok(embedding) => {
                    chunk.embedding = Some(embedding);
                    self.store.upsert(std::slice::from_ref(&chunk)).await.map_err(|e| {
                        error!(chunk_id = %chunk.chunk_id, error = %e, "failed to persist embedding");
                        RagError::PipelineError(format!(
                            "failed to persist embedding for '{}': {e}",
                            chunk.chunk_id
                        ))
                    })?;
                    embedded += 1;
                }
                Err(e) => {
                    warn!(chunk_id = %chunk.chunk_id, error = %e, "embedding failed, chunk left for next run");
                }
            }
        }

        info!(embedded, "embedding backfill complete");
        Ok(embedded)
    }

    /// Query the pipeline: retrieve → rerank.
    ///
    /// Returns at most `top_k` candidates ordered by descending final
    /// score. When an external reranker is configured it replaces the
    /// internal scoring stages; if it fails, the internal reranker takes
    /// over and the query still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the query cannot be
    /// embedded. Store failures degrade to missing kinds, scorer failures
    /// to weighted scores; neither fails the query.
    pub async fn query(&self, query: &str, top_k: usize) -> Result<Vec<RankedCandidate>> {
        // 1. Retrieve candidates of every kind
        let candidates = self
            .retriever
            .retrieve(query, self.config.retrieval_limit)
            .await
            .map_err(|e| {
                error!(error = %e, "retrieval failed");
                e
            })?;

        if candidates.is_empty() {
            info!(result_count = 0, "query completed with no candidates");
            return Ok(Vec::new());
        }

        // 2. External reranker first, internal pipeline as fallback
        if let Some(cross_encoder) = &self.cross_encoder {
            match cross_encoder.rerank(query, &candidates, top_k).await {
                Ok(ranked) => {
                    info!(result_count = ranked.len(), "query completed via external reranker");
                    return Ok(ranked);
                }
                Err(e) => {
                    warn!(error = %e, "external reranker failed, using internal reranking");
                }
            }
        }

        let ranked = self.reranker.rerank(query, candidates, top_k).await;
        info!(result_count = ranked.len(), "query completed");

        Ok(ranked)
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider`, and `store` are required. The chunker
/// defaults to a [`HierarchicalChunker`] over the configured token counter
/// (heuristic unless overridden); the relevance scorer and external
/// reranker are optional.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<PipelineConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn ChunkStore>>,
    token_counter: Option<Arc<dyn TokenCounter>>,
    chunker: Option<Arc<dyn Chunker>>,
    relevance_scorer: Option<Arc<dyn RelevanceScorer>>,
    cross_encoder: Option<Arc<dyn CrossEncoderReranker>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the chunk store backend.
    pub fn store(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the token counter used by the default chunker.
    pub fn token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.token_counter = Some(counter);
        self
    }

    /// Replace the default chunker entirely. The chunker part of the
    /// pipeline config does not apply to a replacement chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set an optional relevance scorer for the reranking stage.
    pub fn relevance_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.relevance_scorer = Some(scorer);
        self
    }

    /// Set an optional external reranker tried before the internal one.
    pub fn cross_encoder(mut self, cross_encoder: Arc<dyn CrossEncoderReranker>) -> Self {
        self.cross_encoder = Some(cross_encoder);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let store =
            self.store.ok_or_else(|| RagError::ConfigError("store is required".to_string()))?;

        let token_counter =
            self.token_counter.unwrap_or_else(|| Arc::new(HeuristicTokenCounter::new()));
        let chunker: Arc<dyn Chunker> = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(HierarchicalChunker::new(config.chunker.clone(), token_counter)),
        };

        let retriever = HybridRetriever::new(
            config.retriever.clone(),
            embedding_provider.clone(),
            store.clone(),
        );
        let reranker = MultiSignalReranker::new(config.reranker.clone(), self.relevance_scorer);

        Ok(RagPipeline {
            config,
            embedding_provider,
            store,
            chunker,
            retriever,
            reranker,
            cross_encoder: self.cross_encoder,
        })
    }
}
