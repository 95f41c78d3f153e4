//! Worker identity and liveness records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{ContainerId, RequestId, TenantName};
use crate::service::{AvailabilityZone, Role};

/// Self-reported health of a worker. Only `Ok` is emitted today.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    Ok,
    Degraded,
}

impl Health {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Degraded => "DEGRADED",
        }
    }
}

impl core::str::FromStr for Health {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Self::Ok),
            "DEGRADED" => Ok(Self::Degraded),
            other => Err(DomainError::validation(format!("unknown health: {other}"))),
        }
    }
}

/// Controller-side classification of a worker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Live,
    Dead,
}

/// Liveness record for one worker process; refreshed by that worker only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub container_id: ContainerId,
    pub tenant: Option<TenantName>,
    pub request_id: Option<RequestId>,
    pub timestamp: DateTime<Utc>,
    pub health: Health,
}

impl WorkerHeartbeat {
    pub fn ok(
        container_id: ContainerId,
        tenant: Option<TenantName>,
        request_id: Option<RequestId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            container_id,
            tenant,
            request_id,
            timestamp,
            health: Health::Ok,
        }
    }

    /// A worker is live iff `now - timestamp < 2 * interval`.
    pub fn liveness(&self, now: DateTime<Utc>, interval: Duration) -> Liveness {
        // Negative age (clock skew) fails `to_std` and counts as fresh.
        match now.signed_duration_since(self.timestamp).to_std() {
            Ok(age) if age >= interval.saturating_mul(2) => Liveness::Dead,
            _ => Liveness::Live,
        }
    }
}

/// Static description of a worker instance, written once at worker start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub container_id: ContainerId,
    pub tenant: TenantName,
    pub role: Role,
    pub zone: AvailabilityZone,
    pub registered_at: DateTime<Utc>,
}
