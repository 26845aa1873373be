use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use tracing::debug;

use crate::database::DbPool;
use crate::domain::error::AppError;
use crate::domain::models::{Chunk, FileId, EMBEDDING_DIM};
use crate::domain::ports::VectorStore;

/// Postgres + pgvector adapter for C3. Runs on its own connection pool,
/// separate from the chat repository's, per §5.
pub struct PgVectorStore {
    pool: DbPool,
}

impl PgVectorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(self.pool.get_pool())
            .await?;

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS rag_chunks (
                fid BIGINT NOT NULL,
                chunk_index BIGINT NOT NULL,
                text TEXT NOT NULL,
                embedding vector({EMBEDDING_DIM}) NOT NULL,
                page_number INT,
                section_type TEXT,
                file_name TEXT,
                PRIMARY KEY (fid, chunk_index)
            )"#
        ))
        .execute(self.pool.get_pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_chunks_fid ON rag_chunks (fid)")
            .execute(self.pool.get_pool())
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_rag_chunks_embedding ON rag_chunks USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100)",
        )
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }
}

fn row_to_chunk(row: &sqlx::postgres::PgRow) -> (Chunk, f32) {
    let embedding: Vector = row.get("embedding");
    let distance: f32 = row.try_get("distance").unwrap_or(0.0);
    let chunk = Chunk {
        fid: row.get("fid"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        embedding: embedding.to_vec(),
        page_number: row.get("page_number"),
        section_type: row.get("section_type"),
        file_name: row.get("file_name"),
    };
    (chunk, distance)
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert_chunks(&self, fid: FileId, chunks: &[Chunk]) -> Result<usize, AppError> {
        for chunk in chunks {
            if chunk.embedding.len() != EMBEDDING_DIM {
                return Err(AppError::DimensionMismatch {
                    expected: EMBEDDING_DIM,
                    actual: chunk.embedding.len(),
                });
            }
        }

        let mut tx = self.pool.get_pool().begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"INSERT INTO rag_chunks (fid, chunk_index, text, embedding, page_number, section_type, file_name)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)
                   ON CONFLICT (fid, chunk_index) DO UPDATE SET
                     text = EXCLUDED.text,
                     embedding = EXCLUDED.embedding,
                     page_number = EXCLUDED.page_number,
                     section_type = EXCLUDED.section_type,
                     file_name = EXCLUDED.file_name"#,
            )
            .bind(fid)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(Vector::from(chunk.embedding.clone()))
            .bind(chunk.page_number)
            .bind(&chunk.section_type)
            .bind(&chunk.file_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(fid, count = chunks.len(), "upserted chunks");
        Ok(chunks.len())
    }

    async fn search(
        &self,
        fid: Option<FileId>,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<(Chunk, f32)>, AppError> {
        if query_vec.len() != EMBEDDING_DIM {
            return Err(AppError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: query_vec.len(),
            });
        }

        let vector = Vector::from(query_vec.to_vec());
        let limit = k as i64;

        let rows = if let Some(fid) = fid {
            sqlx::query(
                r#"SELECT fid, chunk_index, text, embedding, page_number, section_type, file_name,
                          (embedding <=> $1) AS distance
                   FROM rag_chunks
                   WHERE fid = $2
                   ORDER BY distance ASC, chunk_index ASC
                   LIMIT $3"#,
            )
            .bind(&vector)
            .bind(fid)
            .bind(limit)
            .fetch_all(self.pool.get_pool())
            .await?
        } else {
            sqlx::query(
                r#"SELECT fid, chunk_index, text, embedding, page_number, section_type, file_name,
                          (embedding <=> $1) AS distance
                   FROM rag_chunks
                   ORDER BY distance ASC, chunk_index ASC
                   LIMIT $2"#,
            )
            .bind(&vector)
            .bind(limit)
            .fetch_all(self.pool.get_pool())
            .await?
        };

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn delete_by_file(&self, fid: FileId) -> Result<usize, AppError> {
        let result = sqlx::query("DELETE FROM rag_chunks WHERE fid = $1")
            .bind(fid)
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn count_chunks(&self, fid: Option<FileId>) -> Result<i64, AppError> {
        let count: i64 = if let Some(fid) = fid {
            sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks WHERE fid = $1")
                .bind(fid)
                .fetch_one(self.pool.get_pool())
                .await?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks")
                .fetch_one(self.pool.get_pool())
                .await?
        };

        Ok(count)
    }
}
