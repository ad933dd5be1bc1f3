//! pgvector (PostgreSQL) chunk store backend.
//!
//! Provides [`PgVectorStore`] which implements [`ChunkStore`] using
//! [sqlx](https://docs.rs/sqlx) with the
//! [pgvector](https://github.com/pgvector/pgvector) PostgreSQL extension.
//!
//! # Prerequisites
//!
//! - PostgreSQL with the `pgvector` extension installed
//! - [`ensure_schema`](PgVectorStore::ensure_schema) run once before use

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::document::{Chunk, ChunkKind, ChunkPayload};
use crate::error::{RagError, Result};
use crate::store::ChunkStore;

/// The default logical table name (stored as `rag_chunks`).
const DEFAULT_TABLE: &str = "chunks";

/// A [`ChunkStore`] backed by PostgreSQL with the pgvector extension.
///
/// All kinds share one table with a `kind` discriminator column:
/// `chunk_id`, `kind`, `section_id`, `source_document`, `payload` (jsonb),
/// `embedding` (vector, nullable), `metadata` (jsonb). Vector search uses
/// the cosine distance operator, lexical search `ILIKE` over the payload
/// and metadata text.
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
}

impl PgVectorStore {
    /// Create a new pgvector store by connecting to the given database URL.
    pub async fn new(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(5).connect(database_url).await?;
        Ok(Self { pool, table: format!("rag_{DEFAULT_TABLE}") })
    }

    /// Create a new pgvector store from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool, table: format!("rag_{DEFAULT_TABLE}") }
    }

    /// Use a different table name. The name is sanitized to alphanumerics
    /// and underscores and stored with a `rag_` prefix.
    pub fn with_table(mut self, name: &str) -> Result<Self> {
        self.table = Self::sanitize_table_name(name)?;
        Ok(self)
    }

    /// Create the extension, table, and indexes if they do not exist.
    ///
    /// `dimensions` fixes the embedding column width and must match the
    /// embedding provider used with this store.
    pub async fn ensure_schema(&self, dimensions: usize) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;

        let table = &self.table;
        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                chunk_id TEXT PRIMARY KEY, \
                kind TEXT NOT NULL, \
                section_id TEXT NOT NULL, \
                source_document TEXT NOT NULL, \
                payload JSONB NOT NULL, \
                embedding vector({dimensions}), \
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb\
            )"
        );
        sqlx::query(&create_sql).execute(&self.pool).await.map_err(Self::map_err)?;

        let kind_index_sql =
            format!("CREATE INDEX IF NOT EXISTS {table}_kind_idx ON {table} (kind)");
        sqlx::query(&kind_index_sql).execute(&self.pool).await.map_err(Self::map_err)?;

        let vector_index_sql = format!(
            "CREATE INDEX IF NOT EXISTS {table}_embedding_idx \
             ON {table} USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100)"
        );
        sqlx::query(&vector_index_sql).execute(&self.pool).await.map_err(Self::map_err)?;

        debug!(table = %table, dimensions, "ensured pgvector schema");
        Ok(())
    }

    fn map_err(e: sqlx::Error) -> RagError {
        RagError::StoreError { backend: "pgvector".to_string(), message: e.to_string() }
    }

    /// Sanitize a table name. Only allows alphanumeric characters and
    /// underscores.
    fn sanitize_table_name(name: &str) -> Result<String> {
        let sanitized: String =
            name.chars().map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' }).collect();
        if sanitized.is_empty() {
            return Err(RagError::StoreError {
                backend: "pgvector".to_string(),
                message: "table name is empty after sanitization".to_string(),
            });
        }
        Ok(format!("rag_{sanitized}"))
    }

    /// pgvector expects the vector as a string like '[1.0,2.0,3.0]'.
    fn vector_literal(embedding: &[f32]) -> String {
        format!("[{}]", embedding.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","))
    }

    fn chunk_from_row(row: &PgRow) -> Result<Chunk> {
        let chunk_id: String = row.get("chunk_id");
        let section_id: String = row.get("section_id");
        let source_document: String = row.get("source_document");

        let payload_value: serde_json::Value = row.get("payload");
        let payload: ChunkPayload =
            serde_json::from_value(payload_value).map_err(|e| RagError::StoreError {
                backend: "pgvector".to_string(),
                message: format!("invalid payload for chunk '{chunk_id}': {e}"),
            })?;

        let metadata_value: serde_json::Value = row.get("metadata");
        let metadata: HashMap<String, String> = metadata_value
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Chunk { chunk_id, section_id, source_document, payload, embedding: None, metadata })
    }
}

#[async_trait]
impl ChunkStore for PgVectorStore {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let table = &self.table;
        let upsert_sql = format!(
            "INSERT INTO {table} \
                (chunk_id, kind, section_id, source_document, payload, embedding, metadata) \
             VALUES ($1, $2, $3, $4, $5::jsonb, $6::vector, $7::jsonb) \
             ON CONFLICT (chunk_id) DO UPDATE SET \
                kind = EXCLUDED.kind, \
                section_id = EXCLUDED.section_id, \
                source_document = EXCLUDED.source_document, \
                payload = EXCLUDED.payload, \
                embedding = EXCLUDED.embedding, \
                metadata = EXCLUDED.metadata"
        );

        for chunk in chunks {
            let payload_json =
                serde_json::to_string(&chunk.payload).map_err(|e| RagError::StoreError {
                    backend: "pgvector".to_string(),
                    message: format!("failed to serialize payload: {e}"),
                })?;
            let metadata_json =
                serde_json::to_string(&chunk.metadata).unwrap_or_else(|_| "{}".to_string());
            let embedding_literal = chunk.embedding.as_deref().map(Self::vector_literal);

            sqlx::query(&upsert_sql)
                .bind(&chunk.chunk_id)
                .bind(chunk.kind().as_str())
                .bind(&chunk.section_id)
                .bind(&chunk.source_document)
                .bind(&payload_json)
                .bind(&embedding_literal)
                .bind(&metadata_json)
                .execute(&self.pool)
                .await
                .map_err(Self::map_err)?;
        }

        debug!(table = %table, count = chunks.len(), "upserted chunks to pgvector");
        Ok(())
    }

    async fn delete(&self, chunk_ids: &[&str]) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }

        let delete_sql = format!("DELETE FROM {} WHERE chunk_id = ANY($1)", self.table);
        let id_vec: Vec<String> = chunk_ids.iter().map(|s| s.to_string()).collect();

        sqlx::query(&delete_sql).bind(&id_vec).execute(&self.pool).await.map_err(Self::map_err)?;

        debug!(table = %self.table, count = chunk_ids.len(), "deleted chunks from pgvector");
        Ok(())
    }

    async fn vector_search(
        &self,
        kind: ChunkKind,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(Chunk, f32)>> {
        // pgvector cosine distance operator: <=>
        // Returns distance (0 = identical), so score = 1 - distance
        let search_sql = format!(
            "SELECT chunk_id, section_id, source_document, payload, metadata, \
                    1 - (embedding <=> $1::vector) AS score \
             FROM {} \
             WHERE kind = $2 AND embedding IS NOT NULL \
             ORDER BY embedding <=> $1::vector \
             LIMIT $3",
            self.table
        );

        let rows = sqlx::query(&search_sql)
            .bind(Self::vector_literal(embedding))
            .bind(kind.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_err)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let score: f64 = row.get("score");
            results.push((Self::chunk_from_row(row)?, score as f32));
        }
        Ok(results)
    }

    async fn lexical_search(&self, terms: &[String], limit: usize) -> Result<Vec<Chunk>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // One ILIKE pair per term, OR-combined, all parameterized
        let conditions: Vec<String> = (0..terms.len())
            .map(|i| {
                let p = i + 1;
                format!("(payload::text ILIKE ${p} OR metadata::text ILIKE ${p})")
            })
            .collect();
        let search_sql = format!(
            "SELECT chunk_id, section_id, source_document, payload, metadata \
             FROM {} \
             WHERE kind = 'table' AND ({}) \
             LIMIT ${}",
            self.table,
            conditions.join(" OR "),
            terms.len() + 1
        );

        let mut query = sqlx::query(&search_sql);
        for term in terms {
            query = query.bind(format!("%{term}%"));
        }
        query = query.bind(limit as i64);

        let rows = query.fetch_all(&self.pool).await.map_err(Self::map_err)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(Self::chunk_from_row(row)?);
        }
        Ok(results)
    }

    async fn chunks_without_embedding(&self) -> Result<Vec<Chunk>> {
        let select_sql = format!(
            "SELECT chunk_id, section_id, source_document, payload, metadata \
             FROM {} \
             WHERE embedding IS NULL",
            self.table
        );

        let rows = sqlx::query(&select_sql).fetch_all(&self.pool).await.map_err(Self::map_err)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(Self::chunk_from_row(row)?);
        }
        Ok(results)
    }
}
