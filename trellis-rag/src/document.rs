//! Data types for chunks, retrieval candidates, and ranked results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The modality of a chunk.
///
/// Every chunk is exactly one of these kinds, fixed at creation. Retrieval
/// and reranking branch on the kind with exhaustive matches, so adding a
/// kind is a compile-visible change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Prose content retrieved by vector similarity.
    Text,
    /// An image represented by its textual summary.
    Image,
    /// A tabular asset represented by its name and query surface.
    Table,
}

impl ChunkKind {
    /// Stable lowercase name, used in logs and store backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Image => "image",
            ChunkKind::Table => "table",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific content of a chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChunkPayload {
    /// Prose text.
    Text {
        /// The chunk body, headings included.
        body: String,
    },
    /// An image, carried as the summary produced by an external describer.
    Image {
        /// Natural-language summary of the image.
        summary: String,
        /// Image category reported by the describer (e.g. `general`,
        /// `visualization`).
        image_type: String,
    },
    /// A table, carried as the name and query surface produced by an
    /// external analyzer.
    Table {
        /// Analyzer-assigned table name.
        table_name: String,
        /// Generated query surface for the table.
        schema_sql: String,
    },
}

/// How many characters of a table's query surface are shown in its
/// retrievable content.
const TABLE_SQL_PREVIEW_CHARS: usize = 200;

/// A unit of retrievable content.
///
/// Chunks are produced by the [`HierarchicalChunker`](crate::chunking::HierarchicalChunker)
/// (text) or ingested pre-built from external summarizers (images, tables).
/// The `chunk_id` is stable: re-chunking the same input yields the same ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{source_document}_chunk_{n}`.
    pub chunk_id: String,
    /// Heading lineage of the section this chunk came from, segments
    /// joined by `" > "`, or a synthetic `Section_{n}` label.
    pub section_id: String,
    /// Identifier of the originating document.
    pub source_document: String,
    /// Kind-specific content.
    pub payload: ChunkPayload,
    /// Vector embedding, absent until an embedding pass runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Key-value metadata (token counts, split flags, heading levels).
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Creates a chunk with no embedding and empty metadata.
    pub fn new(
        chunk_id: impl Into<String>,
        section_id: impl Into<String>,
        source_document: impl Into<String>,
        payload: ChunkPayload,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            section_id: section_id.into(),
            source_document: source_document.into(),
            payload,
            embedding: None,
            metadata: HashMap::new(),
        }
    }

    /// Attaches an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Inserts a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The kind of this chunk, derived from its payload.
    pub fn kind(&self) -> ChunkKind {
        match &self.payload {
            ChunkPayload::Text { .. } => ChunkKind::Text,
            ChunkPayload::Image { .. } => ChunkKind::Image,
            ChunkPayload::Table { .. } => ChunkKind::Table,
        }
    }

    /// The retrievable text surface of this chunk.
    ///
    /// Text chunks expose their body, image chunks their summary, and table
    /// chunks a rendered `Table: … / SQL: …` preview with the query surface
    /// truncated to a fixed length.
    pub fn content(&self) -> String {
        match &self.payload {
            ChunkPayload::Text { body } => body.clone(),
            ChunkPayload::Image { summary, .. } => summary.clone(),
            ChunkPayload::Table {
                table_name,
                schema_sql,
            } => {
                let preview: String = schema_sql.chars().take(TABLE_SQL_PREVIEW_CHARS).collect();
                if schema_sql.chars().count() > TABLE_SQL_PREVIEW_CHARS {
                    format!("Table: {table_name}\nSQL: {preview}...")
                } else {
                    format!("Table: {table_name}\nSQL: {preview}")
                }
            }
        }
    }

    /// The lowercase text surface used for lexical term matching.
    ///
    /// Table chunks expose their full name, query surface, and metadata;
    /// other kinds fall back to their content.
    pub fn lexical_surface(&self) -> String {
        match &self.payload {
            ChunkPayload::Table {
                table_name,
                schema_sql,
            } => {
                let mut surface = format!("{table_name} {schema_sql}");
                for (key, value) in &self.metadata {
                    surface.push(' ');
                    surface.push_str(key);
                    surface.push(' ');
                    surface.push_str(value);
                }
                surface.to_lowercase()
            }
            _ => self.content().to_lowercase(),
        }
    }
}

/// How a candidate was retrieved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// Cosine similarity over embeddings.
    VectorSimilarity,
    /// Lexical term matching over the chunk's searchable surface.
    KeywordMatching,
}

/// A retrieved [`Chunk`] paired with its retrieval-time score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Retrieval score in `[0.0, 1.0]` (higher is more relevant).
    pub similarity_score: f32,
    /// The retrieval path that produced this candidate.
    pub retrieval_method: RetrievalMethod,
}

/// Where a candidate's relevance score came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceSource {
    /// An external scorer produced the score.
    Scored,
    /// The weighted retrieval score was reused because the candidate was
    /// outside the scoring batch or the scorer call failed.
    Fallback,
}

/// A candidate carrying every intermediate reranking signal.
///
/// Each reranking stage fills its own fields without erasing earlier ones,
/// so a final ranking can always be traced back through its signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// The candidate chunk.
    pub chunk: Chunk,
    /// Retrieval score carried over from the retriever.
    pub similarity_score: f32,
    /// The retrieval path that produced this candidate.
    pub retrieval_method: RetrievalMethod,
    /// Kind weight applied during reranking.
    pub type_weight: f32,
    /// `similarity_score * type_weight`.
    pub weighted_score: f32,
    /// Relevance score in `[0.0, 1.0]`, either externally scored or a
    /// fallback copy of `weighted_score`.
    pub llm_relevance_score: f32,
    /// Whether `llm_relevance_score` was scored or fell back.
    pub relevance_source: RelevanceSource,
    /// Diversity-adjusted score.
    pub mmr_score: f32,
    /// Fused score the final ordering sorts by.
    pub final_score: f32,
}

impl RankedCandidate {
    /// Seeds a ranked candidate from a retrieval candidate.
    ///
    /// The relevance score starts as a fallback copy of the weighted score;
    /// a scoring pass upgrades it for the candidates it reaches.
    pub fn from_candidate(candidate: RetrievalCandidate, type_weight: f32) -> Self {
        let weighted_score = candidate.similarity_score * type_weight;
        Self {
            chunk: candidate.chunk,
            similarity_score: candidate.similarity_score,
            retrieval_method: candidate.retrieval_method,
            type_weight,
            weighted_score,
            llm_relevance_score: weighted_score,
            relevance_source: RelevanceSource::Fallback,
            mmr_score: 0.0,
            final_score: 0.0,
        }
    }
}
