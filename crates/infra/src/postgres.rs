//! Postgres connection wiring shared by the durable store adapters.
//!
//! The store traits are synchronous (the pipeline and the fleet controller block
//! on IO), so the adapters drive sqlx futures through a runtime handle captured
//! at construction. Call them from plain threads or `spawn_blocking`, never
//! from inside an async task.

use std::future::Future;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::runtime::Handle;

use crate::store::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chunk_checkpoints (
    seq          BIGSERIAL PRIMARY KEY,
    request_id   TEXT        NOT NULL,
    chunk_id     INTEGER     NOT NULL CHECK (chunk_id >= 0),
    status       TEXT        NOT NULL,
    recorded_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS chunk_checkpoints_request_seq
    ON chunk_checkpoints (request_id, seq DESC);

CREATE TABLE IF NOT EXISTS worker_info (
    container_id  TEXT PRIMARY KEY,
    tenant        TEXT        NOT NULL,
    role          TEXT        NOT NULL,
    zone          TEXT        NOT NULL,
    registered_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS worker_heartbeats (
    container_id TEXT PRIMARY KEY,
    tenant       TEXT,
    request_id   TEXT,
    ts           TIMESTAMPTZ NOT NULL,
    health       TEXT        NOT NULL
);
"#;

/// Pool plus the runtime handle used to block on queries.
#[derive(Debug, Clone)]
pub struct PgBridge {
    pool: PgPool,
    handle: Handle,
}

impl PgBridge {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }

    /// Connect using the current runtime's handle.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, Handle::current()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}
