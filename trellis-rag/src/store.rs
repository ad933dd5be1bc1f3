//! Chunk store trait for persisting chunks and searching them.

use async_trait::async_trait;

use crate::document::{Chunk, ChunkKind};
use crate::error::Result;

/// A storage backend for chunks of every kind.
///
/// The corpus is partitioned by [`ChunkKind`]: vector search runs within
/// one kind, lexical search covers table chunks. Implementations must be
/// internally synchronized; the retriever calls them through a shared
/// reference.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Upsert chunks, keyed by `chunk_id`. Re-upserting an id replaces the
    /// stored chunk.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

    /// Delete chunks by their ids. Unknown ids are ignored.
    async fn delete(&self, chunk_ids: &[&str]) -> Result<()>;

    /// Search chunks of `kind` by cosine similarity to `embedding`.
    ///
    /// Returns up to `limit` `(chunk, score)` pairs ordered by descending
    /// similarity. Chunks without an embedding are never returned.
    async fn vector_search(
        &self,
        kind: ChunkKind,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(Chunk, f32)>>;

    /// Fetch up to `limit` table chunks whose lexical surface contains any
    /// of `terms` (case-insensitive).
    ///
    /// Relevance ranking of the matches happens in the retriever; the
    /// order of the returned chunks carries no meaning.
    async fn lexical_search(&self, terms: &[String], limit: usize) -> Result<Vec<Chunk>>;

    /// Fetch every chunk that has no embedding yet, for a backfill pass.
    async fn chunks_without_embedding(&self) -> Result<Vec<Chunk>>;
}
