//! Configuration for chunking, retrieval, and reranking.
//!
//! Each component takes its config at construction and never mutates it.
//! Builders validate invariants at `build()`, so a constructed component
//! can trust its parameters.

use serde::{Deserialize, Serialize};

use crate::document::ChunkKind;
use crate::error::{RagError, Result};

/// Parameters for the hierarchical chunker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkerConfig {
    /// Token budget per chunk.
    pub target_token_size: usize,
    /// Fraction of the budget carried as trailing overlap between
    /// consecutive pieces of a split section.
    pub overlap_fraction: f32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { target_token_size: 800, overlap_fraction: 0.1 }
    }
}

impl ChunkerConfig {
    /// Create a new builder for constructing a [`ChunkerConfig`].
    pub fn builder() -> ChunkerConfigBuilder {
        ChunkerConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`ChunkerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ChunkerConfigBuilder {
    config: ChunkerConfig,
}

impl ChunkerConfigBuilder {
    /// Set the token budget per chunk.
    pub fn target_token_size(mut self, tokens: usize) -> Self {
        self.config.target_token_size = tokens;
        self
    }

    /// Set the overlap fraction between consecutive pieces.
    pub fn overlap_fraction(mut self, fraction: f32) -> Self {
        self.config.overlap_fraction = fraction;
        self
    }

    /// Build the [`ChunkerConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `target_token_size == 0`
    /// - `overlap_fraction` is outside `[0.0, 1.0)`
    pub fn build(self) -> Result<ChunkerConfig> {
        if self.config.target_token_size == 0 {
            return Err(RagError::ConfigError(
                "target_token_size must be greater than zero".to_string(),
            ));
        }
        let fraction = self.config.overlap_fraction;
        if !fraction.is_finite() || !(0.0..1.0).contains(&fraction) {
            return Err(RagError::ConfigError(format!(
                "overlap_fraction ({fraction}) must be in [0.0, 1.0)"
            )));
        }
        Ok(self.config)
    }
}

/// Parameters for the hybrid retriever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrieverConfig {
    /// Saturation factor for lexical scores: a table chunk reaches score
    /// 1.0 once each query term occurs this many times on average.
    pub lexical_norm_factor: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self { lexical_norm_factor: 3.0 }
    }
}

impl RetrieverConfig {
    /// Create a new builder for constructing a [`RetrieverConfig`].
    pub fn builder() -> RetrieverConfigBuilder {
        RetrieverConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RetrieverConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrieverConfigBuilder {
    config: RetrieverConfig,
}

impl RetrieverConfigBuilder {
    /// Set the lexical score saturation factor.
    pub fn lexical_norm_factor(mut self, factor: f32) -> Self {
        self.config.lexical_norm_factor = factor;
        self
    }

    /// Build the [`RetrieverConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `lexical_norm_factor` is not a
    /// positive finite number.
    pub fn build(self) -> Result<RetrieverConfig> {
        let factor = self.config.lexical_norm_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RagError::ConfigError(format!(
                "lexical_norm_factor ({factor}) must be positive and finite"
            )));
        }
        Ok(self.config)
    }
}

/// Parameters for the multi-signal reranker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankerConfig {
    /// Weight applied to text candidates.
    pub text_weight: f32,
    /// Weight applied to image candidates.
    pub image_weight: f32,
    /// Weight applied to table candidates.
    pub table_weight: f32,
    /// How many top candidates are sent to the relevance scorer.
    pub scoring_batch_limit: usize,
    /// Relevance-versus-diversity balance in the MMR stage.
    pub mmr_lambda: f32,
    /// Fusion weight of the weighted retrieval score.
    pub fusion_weighted: f32,
    /// Fusion weight of the relevance score.
    pub fusion_llm: f32,
    /// Fusion weight of the diversity-adjusted score.
    pub fusion_mmr: f32,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            text_weight: 1.0,
            image_weight: 0.9,
            table_weight: 1.1,
            scoring_batch_limit: 15,
            mmr_lambda: 0.7,
            fusion_weighted: 0.2,
            fusion_llm: 0.5,
            fusion_mmr: 0.3,
        }
    }
}

impl RerankerConfig {
    /// Create a new builder for constructing a [`RerankerConfig`].
    pub fn builder() -> RerankerConfigBuilder {
        RerankerConfigBuilder::default()
    }

    /// The weight applied to candidates of `kind`.
    pub fn weight_for(&self, kind: ChunkKind) -> f32 {
        match kind {
            ChunkKind::Text => self.text_weight,
            ChunkKind::Image => self.image_weight,
            ChunkKind::Table => self.table_weight,
        }
    }
}

/// Builder for constructing a validated [`RerankerConfig`].
#[derive(Debug, Clone, Default)]
pub struct RerankerConfigBuilder {
    config: RerankerConfig,
}

impl RerankerConfigBuilder {
    /// Set the weight applied to text candidates.
    pub fn text_weight(mut self, weight: f32) -> Self {
        self.config.text_weight = weight;
        self
    }

    /// Set the weight applied to image candidates.
    pub fn image_weight(mut self, weight: f32) -> Self {
        self.config.image_weight = weight;
        self
    }

    /// Set the weight applied to table candidates.
    pub fn table_weight(mut self, weight: f32) -> Self {
        self.config.table_weight = weight;
        self
    }

    /// Set how many top candidates are sent to the relevance scorer.
    pub fn scoring_batch_limit(mut self, limit: usize) -> Self {
        self.config.scoring_batch_limit = limit;
        self
    }

    /// Set the relevance-versus-diversity balance in the MMR stage.
    pub fn mmr_lambda(mut self, lambda: f32) -> Self {
        self.config.mmr_lambda = lambda;
        self
    }

    /// Set the three fusion weights (weighted, relevance, diversity).
    pub fn fusion_weights(mut self, weighted: f32, llm: f32, mmr: f32) -> Self {
        self.config.fusion_weighted = weighted;
        self.config.fusion_llm = llm;
        self.config.fusion_mmr = mmr;
        self
    }

    /// Build the [`RerankerConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - any type weight is negative or non-finite
    /// - `mmr_lambda` is outside `[0.0, 1.0]`
    /// - the fusion weights are negative or do not sum to 1.0
    pub fn build(self) -> Result<RerankerConfig> {
        let c = &self.config;
        for (name, weight) in [
            ("text_weight", c.text_weight),
            ("image_weight", c.image_weight),
            ("table_weight", c.table_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RagError::ConfigError(format!(
                    "{name} ({weight}) must be non-negative and finite"
                )));
            }
        }
        if !c.mmr_lambda.is_finite() || !(0.0..=1.0).contains(&c.mmr_lambda) {
            return Err(RagError::ConfigError(format!(
                "mmr_lambda ({}) must be in [0.0, 1.0]",
                c.mmr_lambda
            )));
        }
        for (name, weight) in [
            ("fusion_weighted", c.fusion_weighted),
            ("fusion_llm", c.fusion_llm),
            ("fusion_mmr", c.fusion_mmr),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RagError::ConfigError(format!(
                    "{name} ({weight}) must be non-negative and finite"
                )));
            }
        }
        let sum = c.fusion_weighted + c.fusion_llm + c.fusion_mmr;
        if (sum - 1.0).abs() > 1e-3 {
            return Err(RagError::ConfigError(format!(
                "fusion weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(self.config)
    }
}

/// Top-level parameters composing the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// How many candidates to fetch per chunk kind before reranking.
    pub retrieval_limit: usize,
    /// Chunker parameters.
    pub chunker: ChunkerConfig,
    /// Retriever parameters.
    pub retriever: RetrieverConfig,
    /// Reranker parameters.
    pub reranker: RerankerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieval_limit: 10,
            chunker: ChunkerConfig::default(),
            retriever: RetrieverConfig::default(),
            reranker: RerankerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for constructing a [`PipelineConfig`].
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set how many candidates to fetch per chunk kind before reranking.
    pub fn retrieval_limit(mut self, limit: usize) -> Self {
        self.config.retrieval_limit = limit;
        self
    }

    /// Set the chunker parameters.
    pub fn chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.config.chunker = chunker;
        self
    }

    /// Set the retriever parameters.
    pub fn retriever(mut self, retriever: RetrieverConfig) -> Self {
        self.config.retriever = retriever;
        self
    }

    /// Set the reranker parameters.
    pub fn reranker(mut self, reranker: RerankerConfig) -> Self {
        self.config.reranker = reranker;
        self
    }

    /// Build the [`PipelineConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `retrieval_limit == 0`.
    pub fn build(self) -> Result<PipelineConfig> {
        if self.config.retrieval_limit == 0 {
            return Err(RagError::ConfigError(
                "retrieval_limit must be greater than zero".to_string(),
            ));
        }
        Ok(self.config)
    }
}
