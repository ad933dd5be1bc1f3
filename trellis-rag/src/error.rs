//! Error types for the `trellis-rag` crate.

use thiserror::Error;

/// Errors that can occur in retrieval pipeline operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in a chunk store backend.
    #[error("Store error ({backend}): {message}")]
    StoreError {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// An error occurred in a relevance scorer.
    #[error("Scorer error ({scorer}): {message}")]
    ScorerError {
        /// The scorer that produced the error.
        scorer: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in an external reranker.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// A convenience result type for retrieval pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
