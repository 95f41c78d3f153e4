//! Collision-checked container id generation.

use std::collections::HashSet;
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use docfleet_core::ContainerId;

use crate::registry::WorkerRegistry;
use crate::store::StoreError;

/// Where candidate ids come from.
pub trait ContainerIdSource: Send + Sync {
    fn next_id(&self) -> ContainerId;
}

/// UUIDv4 ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl ContainerIdSource for RandomIds {
    fn next_id(&self) -> ContainerId {
        ContainerId::random()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContainerIdError {
    #[error("no unique container id after {attempts} attempts")]
    Exhausted { attempts: usize },

    #[error("registry lookup failed: {0}")]
    Registry(#[from] StoreError),
}

/// Draws ids from a source and re-draws until one is unknown to both the
/// registry (worker info and heartbeats) and this generator's own history.
///
/// Generation is serialised, so two callers in one process never receive the
/// same id even before either has written its worker-info row.
#[derive(Debug)]
pub struct ContainerIdGenerator<S = RandomIds> {
    source: S,
    attempt_limit: usize,
    issued: Mutex<HashSet<ContainerId>>,
}

impl ContainerIdGenerator<RandomIds> {
    pub fn random(attempt_limit: usize) -> Self {
        Self::new(RandomIds, attempt_limit)
    }
}

impl<S: ContainerIdSource> ContainerIdGenerator<S> {
    pub fn new(source: S, attempt_limit: usize) -> Self {
        Self {
            source,
            attempt_limit: attempt_limit.max(1),
            issued: Mutex::new(HashSet::new()),
        }
    }

    pub fn generate<R>(&self, registry: &R) -> Result<ContainerId, ContainerIdError>
    where
        R: WorkerRegistry + ?Sized,
    {
        let mut issued = self.issued.lock().map_err(|_| StoreError::LockPoisoned)?;
        for attempt in 1..=self.attempt_limit {
            let candidate = self.source.next_id();
            let taken = issued.contains(&candidate)
                || registry.is_known(&candidate)?
                || registry.get_heartbeat(&candidate)?.is_some();
            if taken {
                debug!(container_id = %candidate, attempt, "container id collision; redrawing");
                continue;
            }
            issued.insert(candidate.clone());
            return Ok(candidate);
        }
        Err(ContainerIdError::Exhausted {
            attempts: self.attempt_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    use chrono::Utc;
    use docfleet_core::{AvailabilityZone, Role, TenantName, WorkerHeartbeat, WorkerInfo};

    use crate::registry::InMemoryWorkerRegistry;

    /// Walks a permutation of `[0, space)`: every value appears once per cycle.
    struct PermutedIds {
        counter: AtomicU64,
        space: u64,
    }

    impl ContainerIdSource for PermutedIds {
        fn next_id(&self) -> ContainerId {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            ContainerId::new(format!("c-{}", (n * 7919) % self.space)).unwrap()
        }
    }

    struct Constant;

    impl ContainerIdSource for Constant {
        fn next_id(&self) -> ContainerId {
            ContainerId::new("always-the-same").unwrap()
        }
    }

    fn info(id: &str) -> WorkerInfo {
        WorkerInfo {
            container_id: ContainerId::new(id).unwrap(),
            tenant: TenantName::new("acme").unwrap(),
            role: Role::User,
            zone: AvailabilityZone::new("us-east-1a").unwrap(),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn ten_thousand_ids_avoid_registry_and_each_other() {
        let registry = InMemoryWorkerRegistry::new();
        let mut taken = HashSet::new();
        for n in (0..20_000).step_by(4) {
            let id = format!("c-{n}");
            if n % 8 == 0 {
                registry.put_worker_info(&info(&id)).unwrap();
            } else {
                registry
                    .put_heartbeat(&WorkerHeartbeat::ok(
                        ContainerId::new(id.clone()).unwrap(),
                        None,
                        None,
                        Utc::now(),
                    ))
                    .unwrap();
            }
            taken.insert(id);
        }

        let generator = ContainerIdGenerator::new(
            PermutedIds {
                counter: AtomicU64::new(0),
                space: 20_000,
            },
            1000,
        );

        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = generator.generate(&registry).unwrap();
            assert!(!taken.contains(id.as_str()), "{id} collides with registry");
            assert!(seen.insert(id.clone()), "{id} issued twice");
        }
    }

    #[test]
    fn repeated_draws_are_never_reissued() {
        let registry = InMemoryWorkerRegistry::new();
        let generator = ContainerIdGenerator::new(Constant, 5);

        assert_eq!(generator.generate(&registry).unwrap().as_str(), "always-the-same");
        assert_eq!(
            generator.generate(&registry),
            Err(ContainerIdError::Exhausted { attempts: 5 })
        );
    }

    #[test]
    fn registry_failure_is_surfaced() {
        let registry = InMemoryWorkerRegistry::new();
        registry.set_unavailable(true);
        let err = ContainerIdGenerator::random(10).generate(&registry).unwrap_err();
        assert!(matches!(err, ContainerIdError::Registry(StoreError::Unavailable(_))));
    }
}
