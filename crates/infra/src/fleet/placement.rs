//! Network placement: which subnet and target group a worker service uses.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use docfleet_core::{AvailabilityZone, Placement, Role};

use super::orchestrator::OrchestratorError;
use crate::config::FleetConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub zone: AvailabilityZone,
    pub tags: BTreeMap<String, String>,
}

impl Subnet {
    pub fn name(&self) -> Option<&str> {
        self.tags.get("Name").map(String::as_str)
    }
}

/// Discovery of subnets and load-balancer target groups.
pub trait NetworkCatalog: Send + Sync {
    fn subnets(&self) -> Result<Vec<Subnet>, OrchestratorError>;

    /// Identifier of the target group named `name`, if it exists.
    fn target_group(&self, name: &str) -> Result<Option<String>, OrchestratorError>;
}

impl<N: NetworkCatalog + ?Sized> NetworkCatalog for Arc<N> {
    fn subnets(&self) -> Result<Vec<Subnet>, OrchestratorError> {
        (**self).subnets()
    }

    fn target_group(&self, name: &str) -> Result<Option<String>, OrchestratorError> {
        (**self).target_group(name)
    }
}

/// `target-group-{role}`.
pub fn target_group_name(role: Role) -> String {
    format!("target-group-{}", role)
}

/// Pick the first subnet (by id) in `zone` that carries every required tag
/// and whose `Name` marks it private. Worker tiers never get a public IP.
pub fn resolve_placement(
    subnets: &[Subnet],
    zone: &AvailabilityZone,
    config: &FleetConfig,
) -> Option<Placement> {
    let mut candidates: Vec<&Subnet> = subnets
        .iter()
        .filter(|s| &s.zone == zone)
        .filter(|s| {
            config
                .required_tags
                .iter()
                .all(|(k, v)| s.tags.get(k) == Some(v))
        })
        .filter(|s| {
            s.name()
                .is_some_and(|n| n.starts_with(&config.private_subnet_prefix))
        })
        .collect();
    candidates.sort_by(|a, b| a.id.cmp(&b.id));

    candidates.first().map(|s| Placement {
        subnet_id: s.id.clone(),
        zone: zone.clone(),
        assign_public_ip: false,
    })
}

/// In-memory network catalog for tests/dev.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNetworkCatalog {
    subnets: Vec<Subnet>,
    target_groups: BTreeMap<String, String>,
}

impl InMemoryNetworkCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// One qualifying private subnet per zone plus a target group per role.
    pub fn standard<'a, I>(zones: I, config: &FleetConfig) -> Self
    where
        I: IntoIterator<Item = &'a AvailabilityZone>,
    {
        let mut catalog = Self::new();
        for zone in zones {
            let mut tags = config.required_tags.clone();
            tags.insert(
                "Name".to_string(),
                format!("{}-{}", config.private_subnet_prefix, zone.suffix()),
            );
            catalog = catalog.with_subnet(Subnet {
                id: format!("subnet-{}", zone),
                zone: zone.clone(),
                tags,
            });
        }
        for role in Role::ALL {
            let name = target_group_name(role);
            catalog = catalog.with_target_group(name.clone(), format!("tg/{name}"));
        }
        catalog
    }

    pub fn with_subnet(mut self, subnet: Subnet) -> Self {
        self.subnets.push(subnet);
        self
    }

    pub fn with_target_group(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.target_groups.insert(name.into(), id.into());
        self
    }
}

impl NetworkCatalog for InMemoryNetworkCatalog {
    fn subnets(&self) -> Result<Vec<Subnet>, OrchestratorError> {
        Ok(self.subnets.clone())
    }

    fn target_group(&self, name: &str) -> Result<Option<String>, OrchestratorError> {
        Ok(self.target_groups.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(z: &str) -> AvailabilityZone {
        AvailabilityZone::new(z).unwrap()
    }

    fn subnet(id: &str, z: &str, name: &str, app: Option<&str>) -> Subnet {
        let mut tags = BTreeMap::from([("Name".to_string(), name.to_string())]);
        if let Some(app) = app {
            tags.insert("Application".to_string(), app.to_string());
        }
        Subnet {
            id: id.into(),
            zone: zone(z),
            tags,
        }
    }

    #[test]
    fn picks_tagged_private_subnet_in_zone() {
        let config = FleetConfig::default();
        let subnets = vec![
            subnet("s-public", "us-east-1a", "public-subnet-1a", Some("docfleet")),
            subnet("s-other-zone", "us-east-1b", "private-subnet-1b", Some("docfleet")),
            subnet("s-untagged", "us-east-1a", "private-subnet-1a", None),
            subnet("s-good", "us-east-1a", "private-subnet-1a", Some("docfleet")),
        ];

        let placement = resolve_placement(&subnets, &zone("us-east-1a"), &config).unwrap();
        assert_eq!(placement.subnet_id, "s-good");
        assert!(!placement.assign_public_ip);
    }

    #[test]
    fn no_candidate_yields_none() {
        let config = FleetConfig::default();
        let subnets = vec![subnet("s", "us-east-1a", "public-subnet", Some("docfleet"))];
        assert!(resolve_placement(&subnets, &zone("us-east-1a"), &config).is_none());
    }

    #[test]
    fn standard_catalog_covers_zones_and_roles() {
        let config = FleetConfig::default();
        let zones = [zone("us-east-1a"), zone("us-east-1b")];
        let catalog = InMemoryNetworkCatalog::standard(&zones, &config);

        for z in &zones {
            assert!(resolve_placement(&catalog.subnets().unwrap(), z, &config).is_some());
        }
        assert_eq!(
            catalog.target_group("target-group-user").unwrap().as_deref(),
            Some("tg/target-group-user")
        );
    }
}
