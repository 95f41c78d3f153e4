//! Runtime configuration, read from environment variables.
//!
//! Every `from_env` has a `from_lookup` twin taking the variable source as a
//! closure, so tests never touch the process environment.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use docfleet_chunking::{ChunkingError, RecursiveSplitter};
use docfleet_core::{AvailabilityZone, ContainerId, Role, TenantName};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

impl ConfigError {
    fn invalid(var: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Invalid {
            var,
            message: message.to_string(),
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(var, e)),
    }
}

fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

/// Chunking parameters for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl PipelineConfig {
    pub const CHUNK_SIZE_VAR: &'static str = "DOCFLEET_CHUNK_SIZE";
    pub const CHUNK_OVERLAP_VAR: &'static str = "DOCFLEET_CHUNK_OVERLAP";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            chunk_size: parse_var(&lookup, Self::CHUNK_SIZE_VAR)?.unwrap_or(defaults.chunk_size),
            chunk_overlap: parse_var(&lookup, Self::CHUNK_OVERLAP_VAR)?
                .unwrap_or(defaults.chunk_overlap),
        };
        config
            .splitter()
            .map_err(|e| ConfigError::invalid(Self::CHUNK_OVERLAP_VAR, e))?;
        Ok(config)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn splitter(&self) -> Result<RecursiveSplitter, ChunkingError> {
        RecursiveSplitter::new(self.chunk_size, self.chunk_overlap)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    pub const INTERVAL_VAR: &'static str = "DOCFLEET_HEARTBEAT_INTERVAL_SECS";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        match parse_var::<u64>(&lookup, Self::INTERVAL_VAR)? {
            Some(0) => Err(ConfigError::invalid(Self::INTERVAL_VAR, "must be at least 1 second")),
            Some(secs) => Ok(Self::default().with_interval(Duration::from_secs(secs))),
            None => Ok(Self::default()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Settings of the fleet controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// `Name` tag prefix marking private subnets.
    pub private_subnet_prefix: String,
    /// Port the worker container listens on behind the target group.
    pub container_port: u16,
    /// Tags every qualifying subnet must carry and every created service gets.
    pub required_tags: BTreeMap<String, String>,
    /// Zone used when a request does not name one.
    pub default_zone: Option<AvailabilityZone>,
    /// Upper bound on container-id draws before giving up.
    pub id_attempt_limit: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            private_subnet_prefix: "private-subnet".to_string(),
            container_port: 8501,
            required_tags: BTreeMap::from([("Application".to_string(), "docfleet".to_string())]),
            default_zone: None,
            id_attempt_limit: 1000,
        }
    }
}

impl FleetConfig {
    pub const ZONE_VAR: &'static str = "DOCFLEET_ZONE";
    pub const SUBNET_PREFIX_VAR: &'static str = "DOCFLEET_PRIVATE_SUBNET_PREFIX";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(prefix) = lookup(Self::SUBNET_PREFIX_VAR) {
            config.private_subnet_prefix = prefix;
        }
        if let Some(zone) = lookup(Self::ZONE_VAR) {
            config.default_zone =
                Some(AvailabilityZone::new(zone).map_err(|e| ConfigError::invalid(Self::ZONE_VAR, e))?);
        }
        Ok(config)
    }

    pub fn with_private_subnet_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.private_subnet_prefix = prefix.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required_tags.insert(key.into(), value.into());
        self
    }

    pub fn with_default_zone(mut self, zone: AvailabilityZone) -> Self {
        self.default_zone = Some(zone);
        self
    }

    pub fn with_id_attempt_limit(mut self, limit: usize) -> Self {
        self.id_attempt_limit = limit;
        self
    }
}

/// HTTP front door settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Zone new workers are placed in.
    pub zone: AvailabilityZone,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            zone: AvailabilityZone::default(),
        }
    }
}

impl ApiConfig {
    pub const BIND_ADDR_VAR: &'static str = "DOCFLEET_BIND_ADDR";
    pub const ZONE_VAR: &'static str = FleetConfig::ZONE_VAR;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(addr) = parse_var(&lookup, Self::BIND_ADDR_VAR)? {
            config.bind_addr = addr;
        }
        if let Some(zone) = lookup(Self::ZONE_VAR) {
            config.zone = AvailabilityZone::new(zone).map_err(|e| ConfigError::invalid(Self::ZONE_VAR, e))?;
        }
        Ok(config)
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_zone(mut self, zone: AvailabilityZone) -> Self {
        self.zone = zone;
        self
    }
}

/// Where durable state lives. No database URL means in-memory stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_url: Option<String>,
}

impl StorageConfig {
    pub const DATABASE_URL_VAR: &'static str = "DATABASE_URL";

    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database_url: lookup(Self::DATABASE_URL_VAR),
        }
    }
}

/// Identity injected into a worker's environment at launch. Read once at
/// process start and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub tenant: TenantName,
    pub role: Role,
    pub container_id: ContainerId,
    pub zone: AvailabilityZone,
}

impl WorkerIdentity {
    pub const TENANT_VAR: &'static str = "TENANT_NAME";
    pub const CONSUMER_VAR: &'static str = "CONSUMER_NAME";
    pub const ROLE_VAR: &'static str = "ROLE";
    pub const CONTAINER_ID_VAR: &'static str = "CONTAINER_ID";
    pub const ZONE_VAR: &'static str = "AVAILABILITY_ZONE";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let tenant = lookup(Self::TENANT_VAR)
            .or_else(|| lookup(Self::CONSUMER_VAR))
            .ok_or(ConfigError::Missing(Self::TENANT_VAR))?;
        let role = lookup(Self::ROLE_VAR).ok_or(ConfigError::Missing(Self::ROLE_VAR))?;
        let container_id =
            lookup(Self::CONTAINER_ID_VAR).ok_or(ConfigError::Missing(Self::CONTAINER_ID_VAR))?;
        let zone = lookup(Self::ZONE_VAR).ok_or(ConfigError::Missing(Self::ZONE_VAR))?;

        Ok(Self {
            tenant: TenantName::new(tenant).map_err(|e| ConfigError::invalid(Self::TENANT_VAR, e))?,
            role: role
                .parse::<Role>()
                .map_err(|e| ConfigError::invalid(Self::ROLE_VAR, e))?,
            container_id: ContainerId::new(container_id)
                .map_err(|e| ConfigError::invalid(Self::CONTAINER_ID_VAR, e))?,
            zone: AvailabilityZone::new(zone).map_err(|e| ConfigError::invalid(Self::ZONE_VAR, e))?,
        })
    }

    /// Environment a launcher injects into the new worker.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        vec![
            (Self::TENANT_VAR, self.tenant.to_string()),
            (Self::CONSUMER_VAR, self.tenant.to_string()),
            (Self::ROLE_VAR, self.role.to_string()),
            (Self::CONTAINER_ID_VAR, self.container_id.to_string()),
            (Self::ZONE_VAR, self.zone.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn pipeline_defaults_and_overrides() {
        assert_eq!(
            PipelineConfig::from_lookup(env(&[])).unwrap(),
            PipelineConfig::default()
        );
        let cfg = PipelineConfig::from_lookup(env(&[
            ("DOCFLEET_CHUNK_SIZE", "500"),
            ("DOCFLEET_CHUNK_OVERLAP", "50"),
        ]))
        .unwrap();
        assert_eq!((cfg.chunk_size, cfg.chunk_overlap), (500, 50));
    }

    #[test]
    fn overlap_not_below_size_is_rejected() {
        let err = PipelineConfig::from_lookup(env(&[("DOCFLEET_CHUNK_SIZE", "100")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(matches!(
            PipelineConfig::from_lookup(env(&[("DOCFLEET_CHUNK_SIZE", "lots")])),
            Err(ConfigError::Invalid { var: "DOCFLEET_CHUNK_SIZE", .. })
        ));
    }

    #[test]
    fn heartbeat_interval_must_be_positive() {
        assert_eq!(
            HeartbeatConfig::from_lookup(env(&[])).unwrap().interval,
            Duration::from_secs(60)
        );
        assert!(HeartbeatConfig::from_lookup(env(&[("DOCFLEET_HEARTBEAT_INTERVAL_SECS", "0")])).is_err());
    }

    #[test]
    fn identity_falls_back_to_consumer_name_and_round_trips_env() {
        let identity = WorkerIdentity::from_lookup(env(&[
            ("CONSUMER_NAME", "acme"),
            ("ROLE", "user"),
            ("CONTAINER_ID", "c-42"),
            ("AVAILABILITY_ZONE", "us-east-1b"),
        ]))
        .unwrap();
        assert_eq!(identity.tenant.as_str(), "acme");
        assert_eq!(identity.role, Role::User);

        let injected: HashMap<String, String> = identity
            .to_env()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let reread = WorkerIdentity::from_lookup(move |k: &str| injected.get(k).cloned()).unwrap();
        assert_eq!(reread, identity);
    }

    #[test]
    fn identity_requires_role() {
        let err = WorkerIdentity::from_lookup(env(&[
            ("TENANT_NAME", "acme"),
            ("CONTAINER_ID", "c-1"),
            ("AVAILABILITY_ZONE", "us-east-1a"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("ROLE"));
    }

    #[test]
    fn api_config_reads_bind_addr_and_zone() {
        assert_eq!(ApiConfig::from_lookup(env(&[])).unwrap(), ApiConfig::default());
        let cfg = ApiConfig::from_lookup(env(&[
            ("DOCFLEET_BIND_ADDR", "127.0.0.1:9000"),
            ("DOCFLEET_ZONE", "eu-west-1c"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.zone.suffix(), "1c");
        assert!(ApiConfig::from_lookup(env(&[("DOCFLEET_BIND_ADDR", "nowhere")])).is_err());
    }

    #[test]
    fn storage_defaults_to_in_memory() {
        assert_eq!(StorageConfig::from_lookup(env(&[])).database_url, None);
        let cfg = StorageConfig::from_lookup(env(&[("DATABASE_URL", "postgres://db/docfleet")]));
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://db/docfleet"));
    }
}
