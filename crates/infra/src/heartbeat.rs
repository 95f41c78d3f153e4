//! Heartbeat emitter and liveness classification.
//!
//! The emitter runs on its own thread for the lifetime of a worker and shares
//! nothing with foreground work except the durable registry. Each tick writes
//! one fresh heartbeat row; a failed write is logged and the next tick tries
//! again.

use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use docfleet_core::{ContainerId, Liveness, RequestId, TenantName, WorkerHeartbeat};

use crate::config::{HeartbeatConfig, WorkerIdentity};
use crate::registry::WorkerRegistry;
use crate::store::StoreError;

/// Handle to stop and join a running emitter.
#[derive(Debug)]
pub struct HeartbeatHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// Stop emitting and wait for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatEmitter {
    interval: Duration,
    request_id: Option<RequestId>,
}

impl HeartbeatEmitter {
    pub fn new(config: &HeartbeatConfig) -> Self {
        Self {
            interval: config.interval,
            request_id: None,
        }
    }

    /// Report `request_id` as the job this worker serves.
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the emitter thread. The first heartbeat is written immediately.
    pub fn spawn<R>(&self, identity: &WorkerIdentity, registry: R) -> io::Result<HeartbeatHandle>
    where
        R: WorkerRegistry + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let interval = self.interval;
        let container_id = identity.container_id.clone();
        let tenant = Some(identity.tenant.clone());
        let request_id = self.request_id.clone();

        let join = thread::Builder::new()
            .name(format!("heartbeat-{}", container_id))
            .spawn(move || {
                emitter_loop(
                    &registry,
                    interval,
                    &container_id,
                    tenant.as_ref(),
                    request_id.as_ref(),
                    shutdown_rx,
                )
            })?;

        Ok(HeartbeatHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

/// Write one heartbeat stamped `now`.
pub fn beat<R: WorkerRegistry + ?Sized>(
    registry: &R,
    container_id: &ContainerId,
    tenant: Option<&TenantName>,
    request_id: Option<&RequestId>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    registry.put_heartbeat(&WorkerHeartbeat::ok(
        container_id.clone(),
        tenant.cloned(),
        request_id.cloned(),
        now,
    ))
}

fn emitter_loop<R: WorkerRegistry>(
    registry: &R,
    interval: Duration,
    container_id: &ContainerId,
    tenant: Option<&TenantName>,
    request_id: Option<&RequestId>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    info!(container_id = %container_id, interval_secs = interval.as_secs_f64(), "heartbeat emitter started");
    loop {
        match beat(registry, container_id, tenant, request_id, Utc::now()) {
            Ok(()) => debug!(container_id = %container_id, "heartbeat written"),
            Err(err) => warn!(container_id = %container_id, error = %err, "heartbeat write failed; skipping tick"),
        }

        match shutdown_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    info!(container_id = %container_id, "heartbeat emitter stopped");
}

/// Workers split by heartbeat freshness at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LivenessReport {
    pub live: Vec<ContainerId>,
    pub dead: Vec<ContainerId>,
}

/// Classify `heartbeats` as of `now`; ids come out sorted.
pub fn classify<'a, I>(heartbeats: I, now: DateTime<Utc>, interval: Duration) -> LivenessReport
where
    I: IntoIterator<Item = &'a WorkerHeartbeat>,
{
    let mut report = LivenessReport::default();
    for hb in heartbeats {
        match hb.liveness(now, interval) {
            Liveness::Live => report.live.push(hb.container_id.clone()),
            Liveness::Dead => report.dead.push(hb.container_id.clone()),
        }
    }
    report.live.sort();
    report.dead.sort();
    report
}
