// 📦 Container Type Entity
//
// Catalogue entry describing a class of container ("40ft Dry", "20ft Reefer").
// Immutable once registered apart from the `active` flag.

use super::{Entity, EntityKind};
use serde::{Deserialize, Serialize};

/// Input for `register_container_type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContainerType {
    pub name: String,
    pub size: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

impl NewContainerType {
    pub fn new(name: &str, size: &str, kind: &str, description: &str) -> Self {
        NewContainerType {
            name: name.to_string(),
            size: size.to_string(),
            kind: kind.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerType {
    pub id: u64,
    pub name: String,
    /// Nominal size label, e.g. "40ft"
    pub size: String,
    /// Construction class, e.g. "Dry", "Reefer", "Open Top"
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub active: bool,
}

impl ContainerType {
    pub fn new(id: u64, input: NewContainerType) -> Self {
        ContainerType {
            id,
            name: input.name,
            size: input.size,
            kind: input.kind,
            description: input.description,
            active: true,
        }
    }
}

impl Entity for ContainerType {
    const KIND: EntityKind = EntityKind::ContainerType;

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
