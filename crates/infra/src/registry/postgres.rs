//! Postgres-backed worker registry (`worker_info`, `worker_heartbeats`).

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;

use docfleet_core::{
    AvailabilityZone, ContainerId, Health, RequestId, Role, TenantName, WorkerHeartbeat,
    WorkerInfo,
};

use super::WorkerRegistry;
use crate::postgres::PgBridge;
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct PostgresWorkerRegistry {
    pg: PgBridge,
}

impl PostgresWorkerRegistry {
    pub fn new(pg: PgBridge) -> Self {
        Self { pg }
    }
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::corrupt(e.to_string())
}

fn info_from_row(row: &PgRow) -> Result<WorkerInfo, StoreError> {
    let container_id: String = row.try_get("container_id")?;
    let tenant: String = row.try_get("tenant")?;
    let role: String = row.try_get("role")?;
    let zone: String = row.try_get("zone")?;
    let registered_at: DateTime<Utc> = row.try_get("registered_at")?;

    Ok(WorkerInfo {
        container_id: ContainerId::new(container_id).map_err(corrupt)?,
        tenant: TenantName::new(tenant).map_err(corrupt)?,
        role: role.parse::<Role>().map_err(corrupt)?,
        zone: AvailabilityZone::new(zone).map_err(corrupt)?,
        registered_at,
    })
}

fn heartbeat_from_row(row: &PgRow) -> Result<WorkerHeartbeat, StoreError> {
    let container_id: String = row.try_get("container_id")?;
    let tenant: Option<String> = row.try_get("tenant")?;
    let request_id: Option<String> = row.try_get("request_id")?;
    let ts: DateTime<Utc> = row.try_get("ts")?;
    let health: String = row.try_get("health")?;

    Ok(WorkerHeartbeat {
        container_id: ContainerId::new(container_id).map_err(corrupt)?,
        tenant: tenant.map(TenantName::new).transpose().map_err(corrupt)?,
        request_id: request_id.map(RequestId::new).transpose().map_err(corrupt)?,
        timestamp: ts,
        health: health.parse::<Health>().map_err(corrupt)?,
    })
}

impl WorkerRegistry for PostgresWorkerRegistry {
    fn put_worker_info(&self, info: &WorkerInfo) -> Result<(), StoreError> {
        self.pg.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO worker_info (container_id, tenant, role, zone, registered_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (container_id)
                DO UPDATE SET
                    tenant = EXCLUDED.tenant,
                    role = EXCLUDED.role,
                    zone = EXCLUDED.zone,
                    registered_at = EXCLUDED.registered_at
                "#,
            )
            .bind(info.container_id.as_str())
            .bind(info.tenant.as_str())
            .bind(info.role.as_str())
            .bind(info.zone.as_str())
            .bind(info.registered_at)
            .execute(self.pg.pool())
            .await
        })?;
        Ok(())
    }

    fn get_worker_info(&self, container_id: &ContainerId) -> Result<Option<WorkerInfo>, StoreError> {
        let row = self.pg.block_on(async {
            sqlx::query(
                r#"
                SELECT container_id, tenant, role, zone, registered_at
                FROM worker_info
                WHERE container_id = $1
                "#,
            )
            .bind(container_id.as_str())
            .fetch_optional(self.pg.pool())
            .await
        })?;
        row.as_ref().map(info_from_row).transpose()
    }

    fn list_worker_info(&self) -> Result<Vec<WorkerInfo>, StoreError> {
        let rows = self.pg.block_on(async {
            sqlx::query(
                r#"
                SELECT container_id, tenant, role, zone, registered_at
                FROM worker_info
                ORDER BY container_id
                "#,
            )
            .fetch_all(self.pg.pool())
            .await
        })?;
        rows.iter().map(info_from_row).collect()
    }

    fn put_heartbeat(&self, heartbeat: &WorkerHeartbeat) -> Result<(), StoreError> {
        self.pg.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO worker_heartbeats (container_id, tenant, request_id, ts, health)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (container_id)
                DO UPDATE SET
                    tenant = EXCLUDED.tenant,
                    request_id = EXCLUDED.request_id,
                    ts = EXCLUDED.ts,
                    health = EXCLUDED.health
                "#,
            )
            .bind(heartbeat.container_id.as_str())
            .bind(heartbeat.tenant.as_ref().map(TenantName::as_str))
            .bind(heartbeat.request_id.as_ref().map(RequestId::as_str))
            .bind(heartbeat.timestamp)
            .bind(heartbeat.health.as_str())
            .execute(self.pg.pool())
            .await
        })?;
        Ok(())
    }

    fn get_heartbeat(
        &self,
        container_id: &ContainerId,
    ) -> Result<Option<WorkerHeartbeat>, StoreError> {
        let row = self.pg.block_on(async {
            sqlx::query(
                r#"
                SELECT container_id, tenant, request_id, ts, health
                FROM worker_heartbeats
                WHERE container_id = $1
                "#,
            )
            .bind(container_id.as_str())
            .fetch_optional(self.pg.pool())
            .await
        })?;
        row.as_ref().map(heartbeat_from_row).transpose()
    }

    fn list_heartbeats(&self) -> Result<Vec<WorkerHeartbeat>, StoreError> {
        let rows = self.pg.block_on(async {
            sqlx::query(
                r#"
                SELECT container_id, tenant, request_id, ts, health
                FROM worker_heartbeats
                ORDER BY container_id
                "#,
            )
            .fetch_all(self.pg.pool())
            .await
        })?;
        rows.iter().map(heartbeat_from_row).collect()
    }
}
