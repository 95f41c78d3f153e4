//! Store and fleet wiring shared by the handlers.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use docfleet_core::AvailabilityZone;
use docfleet_infra::checkpoint::{CheckpointStore, InMemoryCheckpointStore, PostgresCheckpointStore};
use docfleet_infra::config::{ApiConfig, FleetConfig, HeartbeatConfig, StorageConfig};
use docfleet_infra::fleet::{FleetController, InMemoryNetworkCatalog, InMemoryOrchestrator, RequestRouter};
use docfleet_infra::postgres::PgBridge;
use docfleet_infra::registry::{InMemoryWorkerRegistry, PostgresWorkerRegistry, WorkerRegistry};

/// Fleet controller over the in-process substrate.
pub type Fleet = FleetController<Arc<InMemoryOrchestrator>, InMemoryNetworkCatalog, Arc<dyn WorkerRegistry>>;

pub struct AppServices {
    pub fleet: Arc<Fleet>,
    pub router: RequestRouter<Arc<Fleet>>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub registry: Arc<dyn WorkerRegistry>,
    pub heartbeat: HeartbeatConfig,
}

impl AppServices {
    pub fn new(
        zone: AvailabilityZone,
        fleet_config: FleetConfig,
        heartbeat: HeartbeatConfig,
        registry: Arc<dyn WorkerRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let catalog = InMemoryNetworkCatalog::standard([&zone], &fleet_config);
        let fleet = Arc::new(
            FleetController::new(
                Arc::new(InMemoryOrchestrator::new()),
                catalog,
                registry.clone(),
                fleet_config,
            )
            .with_heartbeat_interval(heartbeat.interval),
        );
        Self {
            router: RequestRouter::new(fleet.clone(), zone),
            fleet,
            checkpoints,
            registry,
            heartbeat,
        }
    }

    /// Everything in memory; used by tests and local runs.
    pub fn in_memory(zone: AvailabilityZone) -> Self {
        Self::new(
            zone,
            FleetConfig::default(),
            HeartbeatConfig::default(),
            Arc::new(InMemoryWorkerRegistry::new()),
            Arc::new(InMemoryCheckpointStore::new()),
        )
    }

    pub fn orchestrator(&self) -> &InMemoryOrchestrator {
        self.fleet.orchestrator()
    }
}

/// Wire services from configuration: Postgres-backed registry and checkpoints
/// when a database URL is set, in-memory otherwise.
pub async fn build_services(api: &ApiConfig, storage: &StorageConfig) -> anyhow::Result<AppServices> {
    let fleet_config = FleetConfig::from_env().context("reading fleet configuration")?;
    let heartbeat = HeartbeatConfig::from_env().context("reading heartbeat configuration")?;

    let (registry, checkpoints): (Arc<dyn WorkerRegistry>, Arc<dyn CheckpointStore>) =
        match &storage.database_url {
            Some(url) => {
                let pg = PgBridge::connect(url).await.context("connecting to postgres")?;
                pg.ensure_schema().await.context("creating schema")?;
                info!("using postgres registry and checkpoint store");
                (
                    Arc::new(PostgresWorkerRegistry::new(pg.clone())),
                    Arc::new(PostgresCheckpointStore::new(pg)),
                )
            }
            None => {
                warn!("DATABASE_URL not set; registry and checkpoints are in-memory");
                (
                    Arc::new(InMemoryWorkerRegistry::new()),
                    Arc::new(InMemoryCheckpointStore::new()),
                )
            }
        };

    info!(zone = %api.zone, "orchestration substrate is in-process");
    Ok(AppServices::new(api.zone.clone(), fleet_config, heartbeat, registry, checkpoints))
}
