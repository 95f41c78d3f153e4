//! Postgres-backed checkpoint store.
//!
//! Rows in `chunk_checkpoints` are append-only; `seq` orders them, so "most
//! recent record" means highest `seq` for the key.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::instrument;

use docfleet_core::{ChunkId, ChunkRecord, ChunkStatus, RequestId};

use super::CheckpointStore;
use crate::postgres::PgBridge;
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct PostgresCheckpointStore {
    pg: PgBridge,
}

impl PostgresCheckpointStore {
    pub fn new(pg: PgBridge) -> Self {
        Self { pg }
    }
}

fn chunk_id_from_db(raw: i32) -> Result<ChunkId, StoreError> {
    u32::try_from(raw)
        .map(ChunkId::new)
        .map_err(|_| StoreError::corrupt(format!("negative chunk_id {raw}")))
}

fn record_from_row(row: &PgRow) -> Result<ChunkRecord, StoreError> {
    let request_id: String = row.try_get("request_id")?;
    let chunk_id: i32 = row.try_get("chunk_id")?;
    let status: String = row.try_get("status")?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;

    Ok(ChunkRecord {
        request_id: RequestId::new(request_id).map_err(|e| StoreError::corrupt(e.to_string()))?,
        chunk_id: chunk_id_from_db(chunk_id)?,
        status: status
            .parse::<ChunkStatus>()
            .map_err(|e| StoreError::corrupt(e.to_string()))?,
        recorded_at,
    })
}

impl CheckpointStore for PostgresCheckpointStore {
    #[instrument(skip(self), err)]
    fn record(
        &self,
        request_id: &RequestId,
        chunk_id: ChunkId,
        status: ChunkStatus,
    ) -> Result<(), StoreError> {
        let chunk_id = i32::try_from(chunk_id.get())
            .map_err(|_| StoreError::InvalidKey(format!("chunk_id {chunk_id} out of range")))?;

        self.pg.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO chunk_checkpoints (request_id, chunk_id, status, recorded_at)
                VALUES ($1, $2, $3, NOW())
                "#,
            )
            .bind(request_id.as_str())
            .bind(chunk_id)
            .bind(status.as_str())
            .execute(self.pg.pool())
            .await
        })?;
        Ok(())
    }

    fn last_processed(&self, request_id: &RequestId) -> Result<Option<ChunkId>, StoreError> {
        let max: Option<i32> = self.pg.block_on(async {
            sqlx::query_scalar(
                r#"
                SELECT MAX(chunk_id)
                FROM (
                    SELECT DISTINCT ON (chunk_id) chunk_id, status
                    FROM chunk_checkpoints
                    WHERE request_id = $1
                    ORDER BY chunk_id, seq DESC
                ) latest
                WHERE status = 'PROCESSED'
                "#,
            )
            .bind(request_id.as_str())
            .fetch_one(self.pg.pool())
            .await
        })?;
        max.map(chunk_id_from_db).transpose()
    }

    fn list_failed(&self) -> Result<Vec<RequestId>, StoreError> {
        let ids: Vec<String> = self.pg.block_on(async {
            sqlx::query_scalar(
                r#"
                SELECT request_id
                FROM (
                    SELECT DISTINCT ON (request_id) request_id, status
                    FROM chunk_checkpoints
                    ORDER BY request_id, seq DESC
                ) latest
                WHERE status = 'FAILED'
                ORDER BY request_id
                "#,
            )
            .fetch_all(self.pg.pool())
            .await
        })?;
        ids.into_iter()
            .map(|id| RequestId::new(id).map_err(|e| StoreError::corrupt(e.to_string())))
            .collect()
    }

    fn history(&self, request_id: &RequestId) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = self.pg.block_on(async {
            sqlx::query(
                r#"
                SELECT request_id, chunk_id, status, recorded_at
                FROM chunk_checkpoints
                WHERE request_id = $1
                ORDER BY seq ASC
                "#,
            )
            .bind(request_id.as_str())
            .fetch_all(self.pg.pool())
            .await
        })?;
        rows.iter().map(record_from_row).collect()
    }
}
