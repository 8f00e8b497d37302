// Entity Models
//
// Every entity has:
// - A sequential integer ID per kind, assigned once and never reused
// - An `active` flag in place of deletion (rows are never removed)
// - Values that only change through registry operations

pub mod container;
pub mod container_type;
pub mod contents;
pub mod owner;

pub use container::{Container, ContainerStatus, Inspection, NewContainer};
pub use container_type::{ContainerType, NewContainerType};
pub use contents::{ContainerContents, NewContents};
pub use owner::{NewOwner, Owner};

use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest integer a stored column can hold (SQLite INTEGER is a signed i64)
pub const MAX_STORED_INT: u64 = i64::MAX as u64;

/// Reject caller-supplied numbers that storage could not write back
pub(crate) fn ensure_storable(field: &str, value: u64) -> RegistryResult<u64> {
    if value > MAX_STORED_INT {
        return Err(RegistryError::invalid(format!(
            "{field} {value} exceeds the largest storable value {MAX_STORED_INT}"
        )));
    }
    Ok(value)
}

// ============================================================================
// ENTITY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ContainerType,
    Owner,
    Container,
    Contents,
    Registrar,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::ContainerType => "container type",
            EntityKind::Owner => "owner",
            EntityKind::Container => "container",
            EntityKind::Contents => "contents",
            EntityKind::Registrar => "registrar",
        }
    }

    /// Machine-readable tag used in the audit trail and storage
    pub fn tag(&self) -> &'static str {
        match self {
            EntityKind::ContainerType => "container_type",
            EntityKind::Owner => "owner",
            EntityKind::Container => "container",
            EntityKind::Contents => "contents",
            EntityKind::Registrar => "registrar",
        }
    }

    pub fn from_tag(tag: &str) -> Option<EntityKind> {
        match tag {
            "container_type" | "type" => Some(EntityKind::ContainerType),
            "owner" => Some(EntityKind::Owner),
            "container" => Some(EntityKind::Container),
            "contents" => Some(EntityKind::Contents),
            "registrar" => Some(EntityKind::Registrar),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ENTITY TRAIT
// ============================================================================

/// A record stored in an ID-keyed table
pub trait Entity: Clone {
    const KIND: EntityKind;

    fn id(&self) -> u64;

    fn is_active(&self) -> bool;

    fn deactivate(&mut self);
}
