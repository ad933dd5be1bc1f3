//! # trellis-rag
//!
//! Hierarchical document chunking and hybrid retrieval with multi-signal
//! reranking.
//!
//! ## Overview
//!
//! This crate turns markdown documents into retrievable chunks and answers
//! queries over them:
//!
//! - [`HierarchicalChunker`] - two-pass chunking (markdown structure, then
//!   token budget with overlap)
//! - [`HybridRetriever`] - vector search for text and image chunks, lexical
//!   search for table chunks
//! - [`MultiSignalReranker`] - type weighting, scored relevance, diversity,
//!   and score fusion
//! - [`RagPipeline`] - the orchestrator tying ingest and query together
//!
//! Storage and model access sit behind the [`ChunkStore`],
//! [`EmbeddingProvider`], [`RelevanceScorer`], and [`CrossEncoderReranker`]
//! traits; [`InMemoryChunkStore`] works out of the box and the feature
//! flags below add hosted backends.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis_rag::{InMemoryChunkStore, PipelineConfig, RagPipeline};
//! use trellis_rag::OpenAIEmbeddingProvider;
//!
//! let pipeline = RagPipeline::builder()
//!     .config(PipelineConfig::default())
//!     .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
//!     .store(Arc::new(InMemoryChunkStore::new()))
//!     .build()?;
//!
//! pipeline.ingest(&std::fs::read_to_string("handbook.md")?, "handbook.md").await?;
//!
//! for candidate in pipeline.query("how do I request vacation?", 5).await? {
//!     println!("{:.3} {}", candidate.final_score, candidate.chunk.chunk_id);
//! }
//! ```
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` | [`OpenAIEmbeddingProvider`] and [`OpenAIRelevanceScorer`] |
//! | `cohere` | [`CohereReranker`] external cross-encoder |
//! | `pgvector` | [`PgVectorStore`] backed by Postgres + pgvector |
//! | `hf-tokenizers` | [`HuggingFaceTokenCounter`] for exact token counts |
//! | `full` | All of the above |
//!
//! No feature is enabled by default; the chunker, retriever, reranker, and
//! in-memory store are always available.

pub mod chunking;
#[cfg(feature = "cohere")]
pub mod cohere;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pgvector")]
pub mod pgvector;
pub mod pipeline;
pub mod relevance;
pub mod reranker;
pub mod retriever;
pub mod store;
pub mod tokenizer;

pub use chunking::{Chunker, HierarchicalChunker, MarkdownTableBlock, extract_markdown_tables};
#[cfg(feature = "cohere")]
pub use cohere::CohereReranker;
pub use config::{
    ChunkerConfig, ChunkerConfigBuilder, PipelineConfig, PipelineConfigBuilder, RerankerConfig,
    RerankerConfigBuilder, RetrieverConfig, RetrieverConfigBuilder,
};
pub use document::{
    Chunk, ChunkKind, ChunkPayload, RankedCandidate, RelevanceSource, RetrievalCandidate,
    RetrievalMethod,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use inmemory::InMemoryChunkStore;
#[cfg(feature = "openai")]
pub use openai::{OpenAIEmbeddingProvider, OpenAIRelevanceScorer};
#[cfg(feature = "pgvector")]
pub use pgvector::PgVectorStore;
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use relevance::RelevanceScorer;
pub use reranker::{CrossEncoderReranker, MultiSignalReranker};
pub use retriever::HybridRetriever;
pub use store::ChunkStore;
#[cfg(feature = "hf-tokenizers")]
pub use tokenizer::HuggingFaceTokenCounter;
pub use tokenizer::{HeuristicTokenCounter, TokenCounter};
