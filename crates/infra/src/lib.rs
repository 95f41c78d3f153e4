//! Infrastructure layer: external collaborators, the resumable pipeline, the
//! heartbeat emitter and the fleet controller.

pub mod blob;
pub mod checkpoint;
pub mod config;
pub mod fleet;
pub mod heartbeat;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod postgres;
pub mod registry;
pub mod retrieval;
pub mod store;
pub mod vector;

pub use store::StoreError;
