//! Worker fleet: services per `(role, zone)`, placement, container ids and
//! request routing.

pub mod container_id;
pub mod controller;
pub mod orchestrator;
pub mod placement;
pub mod router;

pub use container_id::{ContainerIdError, ContainerIdGenerator, ContainerIdSource, RandomIds};
pub use controller::{CapacityReport, FleetController, FleetError, ServiceAction, ServiceHandle};
pub use orchestrator::{
    InMemoryOrchestrator, Orchestrator, OrchestratorError, ServiceRecord, ServiceSpec,
};
pub use placement::{
    InMemoryNetworkCatalog, NetworkCatalog, Subnet, resolve_placement, target_group_name,
};
pub use router::{DispatchError, RequestRouter, RouteError, RouteTarget, WorkerProvisioner, route};
