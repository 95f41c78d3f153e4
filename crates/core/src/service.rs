//! Worker pool (service) model: roles, zones, placement and scaling policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Worker tier a request is routed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Admin, Role::User];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Fixed worker image (task definition) for the role.
    pub const fn image(self) -> &'static str {
        match self {
            Self::Admin => "admin-service",
            Self::User => "user-service",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Availability zone name, e.g. `us-east-1a`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AvailabilityZone(String);

impl AvailabilityZone {
    /// Zone used when nothing is configured.
    pub const DEFAULT: &'static str = "us-east-1a";

    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
            return Err(DomainError::invalid_id(format!(
                "AvailabilityZone: '{value}' must be non-empty without whitespace"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Text after the last `-` (`us-east-1a` -> `1a`).
    pub fn suffix(&self) -> &str {
        self.0.rsplit('-').next().unwrap_or(&self.0)
    }
}

impl Default for AvailabilityZone {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl core::fmt::Display for AvailabilityZone {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AvailabilityZone {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AvailabilityZone> for String {
    fn from(value: AvailabilityZone) -> Self {
        value.0
    }
}

/// Identity of one logical worker pool. A service exists at most once per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    pub role: Role,
    pub zone: AvailabilityZone,
}

impl ServiceKey {
    pub fn new(role: Role, zone: AvailabilityZone) -> Self {
        Self { role, zone }
    }

    /// `{role}-service-{zone suffix}`.
    pub fn service_name(&self) -> String {
        format!("{}-service-{}", self.role, self.zone.suffix())
    }
}

impl core::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.role, self.zone)
    }
}

/// Network segment chosen for new instances of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub subnet_id: String,
    pub zone: AvailabilityZone,
    pub assign_public_ip: bool,
}

/// Target-tracking autoscaling policy for a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub min_capacity: u32,
    pub max_capacity: u32,
    /// Target average utilisation, in percent.
    pub target_utilization: f64,
    pub scale_in_cooldown: Duration,
    pub scale_out_cooldown: Duration,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            min_capacity: 1,
            max_capacity: 10,
            target_utilization: 50.0,
            scale_in_cooldown: Duration::from_secs(300),
            scale_out_cooldown: Duration::from_secs(300),
        }
    }
}

impl ScalingPolicy {
    pub fn validate(&self) -> DomainResult<()> {
        if self.min_capacity > self.max_capacity {
            return Err(DomainError::validation(format!(
                "min_capacity {} exceeds max_capacity {}",
                self.min_capacity, self.max_capacity
            )));
        }
        if !(self.target_utilization > 0.0 && self.target_utilization <= 100.0) {
            return Err(DomainError::validation(format!(
                "target_utilization {} must be in (0, 100]",
                self.target_utilization
            )));
        }
        Ok(())
    }

    pub fn admits(&self, desired_count: u32) -> bool {
        (self.min_capacity..=self.max_capacity).contains(&desired_count)
    }
}

/// One worker pool as known to the orchestration substrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub key: ServiceKey,
    pub name: String,
    pub image: String,
    pub desired_count: u32,
    pub placement: Placement,
    pub scaling_policy: ScalingPolicy,
}

impl ServiceDescriptor {
    /// Desired count after one scale-out step, if the policy allows it.
    pub fn scaled_out(&self) -> DomainResult<u32> {
        let next = self.desired_count.saturating_add(1).max(self.scaling_policy.min_capacity);
        if !self.scaling_policy.admits(next) {
            return Err(DomainError::invariant(format!(
                "{} is at max_capacity {}",
                self.name, self.scaling_policy.max_capacity
            )));
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(s: &str) -> AvailabilityZone {
        AvailabilityZone::new(s).unwrap()
    }

    #[test]
    fn role_maps_to_fixed_image() {
        assert_eq!("admin".parse::<Role>().unwrap().image(), "admin-service");
        assert_eq!("user".parse::<Role>().unwrap().image(), "user-service");
        assert!("bogus".parse::<Role>().is_err());
    }

    #[test]
    fn service_name_uses_zone_suffix() {
        let key = ServiceKey::new(Role::Admin, zone("us-east-1a"));
        assert_eq!(key.service_name(), "admin-service-1a");

        let key = ServiceKey::new(Role::User, zone("local"));
        assert_eq!(key.service_name(), "user-service-local");
    }

    #[test]
    fn default_policy_matches_documented_constants() {
        let p = ScalingPolicy::default();
        assert_eq!((p.min_capacity, p.max_capacity), (1, 10));
        assert_eq!(p.target_utilization, 50.0);
        assert_eq!(p.scale_in_cooldown, Duration::from_secs(300));
        assert_eq!(p.scale_out_cooldown, Duration::from_secs(300));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn scale_out_respects_max_capacity() {
        let mut svc = ServiceDescriptor {
            key: ServiceKey::new(Role::User, zone("us-east-1b")),
            name: "user-service-1b".to_string(),
            image: "user-service".to_string(),
            desired_count: 9,
            placement: Placement {
                subnet_id: "subnet-1".to_string(),
                zone: zone("us-east-1b"),
                assign_public_ip: false,
            },
            scaling_policy: ScalingPolicy::default(),
        };
        assert_eq!(svc.scaled_out().unwrap(), 10);
        svc.desired_count = 10;
        assert!(matches!(
            svc.scaled_out(),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
