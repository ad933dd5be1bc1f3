//! In-memory chunk store using cosine similarity.
//!
//! This module provides [`InMemoryChunkStore`], a zero-dependency store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is
//! suitable for development, testing, and small corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, ChunkKind};
use crate::error::Result;
use crate::store::ChunkStore;

/// An in-memory chunk store using cosine similarity for vector search and
/// substring matching for lexical search.
///
/// Chunks are stored in a single `HashMap` keyed by chunk id; the kind
/// partition is applied at query time. All operations are async-safe via
/// `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<String, Chunk>>,
}

impl InMemoryChunkStore {
    /// Create a new empty in-memory chunk store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    /// Whether the store holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Both vectors are L2-normalized before computing the dot product.
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        let mut store = self.chunks.write().await;
        for chunk in chunks {
            store.insert(chunk.chunk_id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn delete(&self, chunk_ids: &[&str]) -> Result<()> {
        let mut store = self.chunks.write().await;
        for id in chunk_ids {
            store.remove(*id);
        }
        Ok(())
    }

    async fn vector_search(
        &self,
        kind: ChunkKind,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(Chunk, f32)>> {
        let store = self.chunks.read().await;

        let mut scored: Vec<(Chunk, f32)> = store
            .values()
            .filter(|chunk| chunk.kind() == kind)
            .filter_map(|chunk| {
                let stored = chunk.embedding.as_ref()?;
                let score = cosine_similarity(stored, embedding);
                Some((chunk.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn lexical_search(&self, terms: &[String], limit: usize) -> Result<Vec<Chunk>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.chunks.read().await;

        let mut matches: Vec<Chunk> = store
            .values()
            .filter(|chunk| chunk.kind() == ChunkKind::Table)
            .filter(|chunk| {
                let surface = chunk.lexical_surface();
                terms.iter().any(|term| surface.contains(term.as_str()))
            })
            .cloned()
            .collect();

        matches.truncate(limit);
        Ok(matches)
    }

    async fn chunks_without_embedding(&self) -> Result<Vec<Chunk>> {
        let store = self.chunks.read().await;
        Ok(store
            .values()
            .filter(|chunk| chunk.embedding.is_none())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_magnitude_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn identical_vectors_score_one() {
        let similarity = cosine_similarity(&[0.6, 0.8], &[0.6, 0.8]);
        assert!((similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_score_negative_one() {
        let similarity = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((similarity + 1.0).abs() < 1e-6);
    }
}
