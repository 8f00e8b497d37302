// 🚢 Container Entity - Individual physical container
//
// References a ContainerType and an Owner (both must be active when written).
// Mutable values: status, owner_id, last_inspection_date, active.

use super::{ensure_storable, Entity, EntityKind};
use crate::access::Principal;
use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CONTAINER STATUS
// ============================================================================

/// Closed set of lifecycle states. Anything else is rejected on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerStatus {
    /// Empty and ready to be booked
    Available,

    /// Booked / being loaded at a depot
    InUse,

    /// On a vessel, train or truck
    InTransit,

    /// Out of service for repair or survey
    Maintenance,

    /// Permanently withdrawn from service
    Decommissioned,
}

impl ContainerStatus {
    pub const ALL: [ContainerStatus; 5] = [
        ContainerStatus::Available,
        ContainerStatus::InUse,
        ContainerStatus::InTransit,
        ContainerStatus::Maintenance,
        ContainerStatus::Decommissioned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Available => "available",
            ContainerStatus::InUse => "in-use",
            ContainerStatus::InTransit => "in-transit",
            ContainerStatus::Maintenance => "maintenance",
            ContainerStatus::Decommissioned => "decommissioned",
        }
    }
}

impl FromStr for ContainerStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContainerStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| RegistryError::invalid(format!("unrecognised container status `{s}`")))
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CONTAINER ENTITY
// ============================================================================

/// Input for `register_container`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContainer {
    pub container_number: String,
    pub container_type_id: u64,
    pub owner_id: u64,
    pub manufactured_date: u64,
    /// Maximum payload in kg
    pub capacity_weight: u64,
    /// Internal volume in cubic metres
    pub capacity_volume: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: u64,
    /// ISO 6346 style number, e.g. "MSCU1234567". Not required to be unique.
    pub container_number: String,
    pub container_type_id: u64,
    pub owner_id: u64,
    pub manufactured_date: u64,
    pub last_inspection_date: u64,
    pub capacity_weight: u64,
    pub capacity_volume: u64,
    pub status: ContainerStatus,
    pub active: bool,
}

impl Container {
    /// New containers start `available` with their first inspection stamped
    /// at `registered_at` (never earlier than the manufacture date).
    pub fn new(id: u64, input: NewContainer, registered_at: u64) -> Self {
        Container {
            id,
            container_number: input.container_number,
            container_type_id: input.container_type_id,
            owner_id: input.owner_id,
            manufactured_date: input.manufactured_date,
            last_inspection_date: registered_at.max(input.manufactured_date),
            capacity_weight: input.capacity_weight,
            capacity_volume: input.capacity_volume,
            status: ContainerStatus::Available,
            active: true,
        }
    }

    pub fn is_available(&self) -> bool {
        self.active && self.status == ContainerStatus::Available
    }

    /// Next inspection stamp: the current time, but always after the last one.
    /// Fails once no later stamp can be stored.
    pub fn next_inspection_date(&self, now: u64) -> RegistryResult<u64> {
        let after_last = self
            .last_inspection_date
            .checked_add(1)
            .ok_or_else(|| RegistryError::invalid("no inspection date after the last one"))?;
        ensure_storable("inspection date", now.max(after_last))
    }
}

impl Entity for Container {
    const KIND: EntityKind = EntityKind::Container;

    fn id(&self) -> u64 {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn deactivate(&mut self) {
        self.active = false;
    }
}

// ============================================================================
// INSPECTION
// ============================================================================

/// One entry of a container's inspection history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspection {
    pub container_id: u64,
    pub inspected_at: u64,
    pub inspector: Principal,
}
