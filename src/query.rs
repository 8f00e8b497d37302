// 🔎 Query Service - Read-only projections
//
// Absence is a normal outcome here (`None` / `false`), never an error.
// Every result is an owned clone taken under the read lock, so callers never
// see a half-applied update.

use crate::access::Principal;
use crate::entities::{Container, ContainerContents, ContainerType, Inspection, Owner};
use crate::registry::{read_state, RegistryState};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard};

/// Row counts per entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub registrars: usize,
    pub container_types: usize,
    pub owners: usize,
    pub containers: usize,
    pub active_containers: usize,
    pub containers_with_contents: usize,
    pub inspections: usize,
}

#[derive(Clone)]
pub struct QueryService {
    state: Arc<RwLock<RegistryState>>,
}

impl QueryService {
    pub(crate) fn new(state: Arc<RwLock<RegistryState>>) -> Self {
        QueryService { state }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        read_state(&self.state)
    }

    // ========================================================================
    // DETAIL LOOKUPS
    // ========================================================================

    pub fn get_container(&self, id: u64) -> Option<Container> {
        self.read().store.get::<Container>(id).ok().cloned()
    }

    pub fn get_container_type(&self, id: u64) -> Option<ContainerType> {
        self.read().store.get::<ContainerType>(id).ok().cloned()
    }

    pub fn get_owner(&self, id: u64) -> Option<Owner> {
        self.read().store.get::<Owner>(id).ok().cloned()
    }

    /// Current contents of a container, if any were recorded
    pub fn get_contents(&self, container_id: u64) -> Option<ContainerContents> {
        self.read().store.contents(container_id).cloned()
    }

    // ========================================================================
    // DERIVED PREDICATES (recomputed on every call)
    // ========================================================================

    /// False for unknown IDs
    pub fn is_active(&self, container_id: u64) -> bool {
        self.read()
            .store
            .get::<Container>(container_id)
            .map(|c| c.active)
            .unwrap_or(false)
    }

    /// True iff the container exists, is active and has status `available`
    pub fn is_available(&self, container_id: u64) -> bool {
        self.read()
            .store
            .get::<Container>(container_id)
            .map(Container::is_available)
            .unwrap_or(false)
    }

    pub fn is_registrar(&self, address: &Principal) -> bool {
        self.read().access.is_registrar(address)
    }

    // ========================================================================
    // LISTINGS
    // ========================================================================

    pub fn registrars(&self) -> Vec<Principal> {
        self.read().access.registrars()
    }

    /// Inspections of one container, oldest first
    pub fn inspection_history(&self, container_id: u64) -> Vec<Inspection> {
        self.read().store.inspections(container_id).to_vec()
    }

    /// Containers currently held by an owner, in ID order
    pub fn containers_by_owner(&self, owner_id: u64) -> Vec<Container> {
        self.read()
            .store
            .table::<Container>()
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.read();
        let containers = state.store.table::<Container>();

        RegistryStats {
            registrars: state.access.registrars().len(),
            container_types: state.store.table::<ContainerType>().len(),
            owners: state.store.table::<Owner>().len(),
            containers: containers.len(),
            active_containers: containers.iter().filter(|c| c.active).count(),
            containers_with_contents: state.store.all_contents().count(),
            inspections: state.store.all_inspections().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::access::Principal;
    use crate::clock::ManualClock;
    use crate::entities::{NewContainer, NewContainerType, NewOwner};
    use crate::registry::RegistryService;
    use std::sync::Arc;

    fn seeded() -> (RegistryService, Principal) {
        let registry = RegistryService::with_clock(Arc::new(ManualClock::new(100100)));
        let registrar = Principal::new("ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM");
        registry.initialize(&registrar).unwrap();
        registry
            .register_container_type(
                &registrar,
                NewContainerType::new("Standard Dry Container", "40ft", "Dry", ""),
            )
            .unwrap();
        registry
            .register_owner(&registrar, NewOwner::new("Global Shipping Co.", "GSC-12345", ""))
            .unwrap();
        registry
            .register_owner(&registrar, NewOwner::new("Pacific Freight Ltd.", "PFL-0042", ""))
            .unwrap();
        for owner_id in [1, 2, 1] {
            registry
                .register_container(
                    &registrar,
                    NewContainer {
                        container_number: format!("MSCU000000{owner_id}"),
                        container_type_id: 1,
                        owner_id,
                        manufactured_date: 100000,
                        capacity_weight: 30480,
                        capacity_volume: 67,
                    },
                )
                .unwrap();
        }
        (registry, registrar)
    }

    #[test]
    fn test_lookups() {
        let (registry, _) = seeded();
        let query = registry.query();

        assert_eq!(query.get_container_type(1).unwrap().name, "Standard Dry Container");
        assert_eq!(query.get_owner(2).unwrap().name, "Pacific Freight Ltd.");
        assert_eq!(query.get_container(3).unwrap().owner_id, 1);

        assert!(query.get_container(4).is_none());
        assert!(query.get_container_type(0).is_none());
        assert!(query.get_owner(3).is_none());
        assert!(query.get_contents(1).is_none());
    }

    #[test]
    fn test_predicates_for_unknown_container() {
        let (registry, _) = seeded();
        let query = registry.query();

        assert!(!query.is_active(99));
        assert!(!query.is_available(99));
        assert!(query.is_active(1));
        assert!(query.is_available(1));
    }

    #[test]
    fn test_predicates_track_updates() {
        let (registry, registrar) = seeded();
        let query = registry.query();

        registry
            .update_container_status(&registrar, 1, "maintenance")
            .unwrap();
        assert!(query.is_active(1));
        assert!(!query.is_available(1));

        registry
            .update_container_status(&registrar, 1, "available")
            .unwrap();
        assert!(query.is_available(1));
    }

    #[test]
    fn test_containers_by_owner() {
        let (registry, registrar) = seeded();
        let query = registry.query();

        let ids: Vec<u64> = query.containers_by_owner(1).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);

        registry.transfer_ownership(&registrar, 3, 2).unwrap();
        let ids: Vec<u64> = query.containers_by_owner(2).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_stats() {
        let (registry, registrar) = seeded();
        registry.deactivate_container(&registrar, 2).unwrap();
        registry.record_inspection(&registrar, 1).unwrap();

        let stats = registry.query().stats();
        assert_eq!(stats.registrars, 1);
        assert_eq!(stats.container_types, 1);
        assert_eq!(stats.owners, 2);
        assert_eq!(stats.containers, 3);
        assert_eq!(stats.active_containers, 2);
        assert_eq!(stats.containers_with_contents, 0);
        assert_eq!(stats.inspections, 1);
    }
}
