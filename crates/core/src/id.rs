//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of one ingestion job; groups all chunks of one document.
///
/// Doubles as the document name and the storage bucket suffix, so it must be
/// non-empty with no whitespace or path separators, and must not start with `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId(String);

/// Name of a tenant (multi-tenant boundary), taken from the routed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantName(String);

/// Opaque unique identifier of one worker instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

fn validate_request_id(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_string());
    }
    if s.chars().any(char::is_whitespace) {
        return Err("must not contain whitespace".to_string());
    }
    // The id names a storage bucket and object keys.
    if s.contains('/') || s.contains('\\') {
        return Err("must not contain '/' or '\\'".to_string());
    }
    if s.starts_with('.') {
        return Err("must not start with '.'".to_string());
    }
    Ok(())
}

fn validate_tenant_name(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_string());
    }
    if s.contains('/') || s.chars().any(char::is_whitespace) {
        return Err("must not contain '/' or whitespace".to_string());
    }
    Ok(())
}

fn validate_container_id(s: &str) -> Result<(), String> {
    if s.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    Ok(())
}

macro_rules! impl_string_newtype {
    ($t:ident, $name:literal, $validate:path) => {
        impl $t {
            /// Validate and wrap a raw identifier.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                $validate(&value).map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_string_newtype!(RequestId, "RequestId", validate_request_id);
impl_string_newtype!(TenantName, "TenantName", validate_tenant_name);
impl_string_newtype!(ContainerId, "ContainerId", validate_container_id);

impl ContainerId {
    /// Random identifier (UUIDv4). Uniqueness against the registry is the
    /// caller's job.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Position of a chunk within its document.
///
/// Dense and contiguous from 0 within a `RequestId`; defines processing order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(u32);

impl ChunkId {
    pub const FIRST: ChunkId = ChunkId(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u32> for ChunkId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
