//! `docfleet-core`: shared data model for the ingestion pipeline and the
//! worker fleet.
//!
//! This crate contains **pure domain** types (no infrastructure concerns).

pub mod chunk;
pub mod error;
pub mod id;
pub mod service;
pub mod worker;

pub use chunk::{ChunkRecord, ChunkStatus};
pub use error::{DomainError, DomainResult};
pub use id::{ChunkId, ContainerId, RequestId, TenantName};
pub use service::{
    AvailabilityZone, Placement, Role, ScalingPolicy, ServiceDescriptor, ServiceKey,
};
pub use worker::{Health, Liveness, WorkerHeartbeat, WorkerInfo};
