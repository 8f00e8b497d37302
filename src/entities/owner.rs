// 🏢 Owner Entity - Organisation owning containers

use super::{Entity, EntityKind};
use crate::access::Principal;
use serde::{Deserialize, Serialize};

/// Input for `register_owner`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOwner {
    pub name: String,
    pub registration_number: String,
    pub contact_info: String,
    /// Identity of the owning organisation; defaults to the registering caller
    #[serde(default)]
    pub address: Option<Principal>,
}

impl NewOwner {
    pub fn new(name: &str, registration_number: &str, contact_info: &str) -> Self {
        NewOwner {
            name: name.to_string(),
            registration_number: registration_number.to_string(),
            contact_info: contact_info.to_string(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: Principal) -> Self {
        self.address = Some(address);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: u64,
    pub name: String,
    pub address: Principal,
    /// Company / trade registry number, e.g. "GSC-12345"
    pub registration_number: String,
    pub contact_info: String,
    pub active: bool,
}

impl Owner {
    pub fn new(id: u64, input: NewOwner, registrant: &Principal) -> Self {
        Owner {
            id,
            name: input.name,
            address: input.address.unwrap_or_else(|| registrant.clone()),
            registration_number: input.registration_number,
            contact_info: input.contact_info,
            active: true,
        }
    }
}

impl Entity for Owner {
    const KIND: EntityKind = EntityKind::Owner;

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
