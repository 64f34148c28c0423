//! SQLite-backed [`ChunkStore`].
//!
//! One row per chunk in the `chunks` table. Vector search loads the live
//! rows and ranks them in process with cosine similarity; the expiry filter
//! is part of the SQL so expired rows are never scored, purged or not.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use sqlx::{Row, SqlitePool};

use doco_core::clock::{Clock, SystemClock};
use doco_core::embedding::{blob_to_vec, vec_to_blob};
use doco_core::models::{NewChunk, ScoredChunk};
use doco_core::store::{rank_candidates, ChunkStore, StoreStats, VectorSearchParams};

use crate::config::Config;
use crate::{db, migrate};

pub struct SqliteChunkStore {
    pool: SqlitePool,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SqliteChunkStore {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self::with_clock(pool, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { pool, ttl, clock }
    }

    /// Connect using `[db]`, make sure the schema exists, and apply the
    /// configured TTL.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool, Duration::minutes(config.store.ttl_minutes)))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn stamps(&self) -> (i64, i64) {
        let created_at = self.clock.now();
        let expires_at = created_at + self.ttl;
        (created_at.timestamp_millis(), expires_at.timestamp_millis())
    }
}

const INSERT_CHUNK: &str = r#"
    INSERT INTO chunks (chunk_index, text, embedding, created_at, expires_at)
    VALUES (?, ?, ?, ?, ?)
"#;

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<()> {
        let (created_at, expires_at) = self.stamps();
        sqlx::query(INSERT_CHUNK)
            .bind(chunk.index)
            .bind(&chunk.text)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(created_at)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All chunks of a batch share one timestamp and land in one
    /// transaction: either every row is written or none is.
    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
        let (created_at, expires_at) = self.stamps();
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(INSERT_CHUNK)
                .bind(chunk.index)
                .bind(&chunk.text)
                .bind(vec_to_blob(&chunk.embedding))
                .bind(created_at)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn vector_search(
        &self,
        query: &[f32],
        params: &VectorSearchParams,
    ) -> Result<Vec<ScoredChunk>> {
        let now = self.clock.now().timestamp_millis();
        let rows = sqlx::query(
            "SELECT chunk_index, text, embedding FROM chunks WHERE expires_at > ? ORDER BY id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows.iter().map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            (
                row.get::<i64, _>("chunk_index"),
                row.get::<String, _>("text"),
                blob_to_vec(&blob),
            )
        });

        Ok(rank_candidates(query, candidates, params))
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = self.clock.now().timestamp_millis();
        let result = sqlx::query("DELETE FROM chunks WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let now = self.clock.now().timestamp_millis();
        let live: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE expires_at > ?")
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        let expired: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE expires_at <= ?")
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreStats {
            live: live as u64,
            expired: expired as u64,
        })
    }
}
