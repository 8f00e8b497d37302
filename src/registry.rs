// 🏛️ Registry Service - Authorization + referential integrity + state transitions
//
// Every mutation runs under the state write lock in three phases:
// 1. the caller must hold the registrar role
// 2. referenced rows must exist (and be active where they are FK targets)
// 3. values must be in domain
// Only then is the single primary record written and an audit event appended.
// A failure in any phase returns before anything is touched.
//
// Committed rows and events wait in a change set until storage takes them.

use crate::access::{AccessControl, Principal};
use crate::clock::{Clock, SystemClock};
use crate::entities::{
    ensure_storable, Container, ContainerContents, ContainerStatus, ContainerType, EntityKind,
    Inspection, NewContainer, NewContainerType, NewContents, NewOwner, Owner,
};
use crate::error::{RegistryError, RegistryResult};
use crate::events::Event;
use crate::query::QueryService;
use crate::store::{EntityStore, Stored};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::mem;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

// ============================================================================
// SHARED STATE
// ============================================================================

/// A stored row touched since the last hand-off to storage
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RowKey {
    Registrar(Principal),
    ContainerType(u64),
    Owner(u64),
    Container(u64),
    Contents(u64),
}

#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    pub(crate) access: AccessControl,
    pub(crate) store: EntityStore,
    /// Audit events not yet handed to storage, oldest first
    journal: Vec<Event>,
    dirty: BTreeSet<RowKey>,
    new_inspections: Vec<Inspection>,
}

impl RegistryState {
    fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        RegistryState {
            access: AccessControl::from_members(snapshot.registrars),
            store: EntityStore::from_parts(
                snapshot.container_types,
                snapshot.owners,
                snapshot.containers,
                snapshot.contents,
                snapshot.inspections,
            ),
            ..Default::default()
        }
    }

    /// Note a committed write to `row` together with its audit event
    fn record(&mut self, row: RowKey, event: Event) {
        self.dirty.insert(row);
        self.journal.push(event);
    }

    fn take_changes(&mut self) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for row in mem::take(&mut self.dirty) {
            match row {
                RowKey::Registrar(address) => changes.registrars.push(address),
                RowKey::ContainerType(id) => changes
                    .container_types
                    .extend(self.store.get::<ContainerType>(id).ok().cloned()),
                RowKey::Owner(id) => changes
                    .owners
                    .extend(self.store.get::<Owner>(id).ok().cloned()),
                RowKey::Container(id) => changes
                    .containers
                    .extend(self.store.get::<Container>(id).ok().cloned()),
                RowKey::Contents(id) => changes
                    .contents
                    .extend(self.store.contents(id).cloned()),
            }
        }
        changes.inspections = mem::take(&mut self.new_inspections);
        changes.events = mem::take(&mut self.journal);

        changes
    }
}

pub(crate) fn read_state(lock: &RwLock<RegistryState>) -> RwLockReadGuard<'_, RegistryState> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_state(lock: &RwLock<RegistryState>) -> RwLockWriteGuard<'_, RegistryState> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Complete persisted image of the registry (audit events excluded)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub registrars: Vec<Principal>,
    pub container_types: Vec<ContainerType>,
    pub owners: Vec<Owner>,
    pub containers: Vec<Container>,
    pub contents: Vec<ContainerContents>,
    pub inspections: Vec<Inspection>,
}

/// Rows and audit events committed since the last hand-off to storage.
/// Rows carry their current values; inspections are only the new ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub registrars: Vec<Principal>,
    pub container_types: Vec<ContainerType>,
    pub owners: Vec<Owner>,
    pub containers: Vec<Container>,
    pub contents: Vec<ContainerContents>,
    pub inspections: Vec<Inspection>,
    pub events: Vec<Event>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.registrars.is_empty()
            && self.container_types.is_empty()
            && self.owners.is_empty()
            && self.containers.is_empty()
            && self.contents.is_empty()
            && self.inspections.is_empty()
            && self.events.is_empty()
    }
}

// ============================================================================
// REGISTRY SERVICE
// ============================================================================

/// Entry point for every write. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RegistryService {
    state: Arc<RwLock<RegistryState>>,
    clock: Arc<dyn Clock>,
}

impl Default for RegistryService {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryService {
    /// Empty registry stamped by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        RegistryService {
            state: Arc::new(RwLock::new(RegistryState::default())),
            clock,
        }
    }

    /// Restore a registry from storage. ID counters resume after the highest
    /// stored ID of each kind.
    pub fn from_snapshot(snapshot: RegistrySnapshot, clock: Arc<dyn Clock>) -> Self {
        RegistryService {
            state: Arc::new(RwLock::new(RegistryState::from_snapshot(snapshot))),
            clock,
        }
    }

    /// Replace the whole state with `snapshot`, discarding changes not yet
    /// taken by storage. Used to roll back after a failed save.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        *write_state(&self.state) = RegistryState::from_snapshot(snapshot);
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = read_state(&self.state);
        let store = &state.store;

        RegistrySnapshot {
            registrars: state.access.registrars(),
            container_types: store.table::<ContainerType>().iter().cloned().collect(),
            owners: store.table::<Owner>().iter().cloned().collect(),
            containers: store.table::<Container>().iter().cloned().collect(),
            contents: store.all_contents().cloned().collect(),
            inspections: store.all_inspections().cloned().collect(),
        }
    }

    /// Read-only view sharing this registry's state
    pub fn query(&self) -> QueryService {
        QueryService::new(Arc::clone(&self.state))
    }

    /// Hand every change committed since the last call to the caller.
    /// Nothing is kept in memory afterwards.
    pub fn take_changes(&self) -> ChangeSet {
        write_state(&self.state).take_changes()
    }

    // ========================================================================
    // REGISTRARS
    // ========================================================================

    /// Bootstrap path: on an empty registry the caller becomes the first
    /// registrar. Afterwards succeeds only for existing registrars.
    ///
    /// Returns `true` when the caller was newly admitted.
    pub fn initialize(&self, caller: &Principal) -> RegistryResult<bool> {
        self.add_registrar(caller, caller.clone())
    }

    /// Admit `address` to the registrar role (see `AccessControl::bootstrap_or_add`)
    pub fn add_registrar(&self, caller: &Principal, address: Principal) -> RegistryResult<bool> {
        let mut state = write_state(&self.state);
        let bootstrapping = state.access.is_empty();

        let added = match state.access.bootstrap_or_add(caller, &address) {
            Ok(added) => added,
            Err(err) => {
                warn!(operation = "add_registrar", caller = %caller, "rejected: caller is not a registrar");
                return Err(err);
            }
        };

        if bootstrapping {
            info!(registrar = %caller, "registrar role bootstrapped");
            let event = Event::record(
                "registrar_added",
                EntityKind::Registrar,
                caller,
                json!({ "bootstrap": true }),
                caller,
            );
            state.record(RowKey::Registrar(caller.clone()), event);
        }
        if added && (&address != caller || !bootstrapping) {
            info!(registrar = %address, added_by = %caller, "registrar added");
            let event = Event::record(
                "registrar_added",
                EntityKind::Registrar,
                &address,
                json!({ "bootstrap": false }),
                caller,
            );
            state.record(RowKey::Registrar(address), event);
        }

        Ok(added)
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    pub fn register_container_type(
        &self,
        caller: &Principal,
        input: NewContainerType,
    ) -> RegistryResult<u64> {
        self.mutate("register_container_type", caller, |state, _now| {
            let data = json!({ "name": input.name, "size": input.size, "type": input.kind });
            let id = state.store.create(|id| ContainerType::new(id, input));

            info!(container_type_id = id, actor = %caller, "container type registered");
            let event = Event::record(
                "container_type_registered",
                EntityKind::ContainerType,
                id,
                data,
                caller,
            );
            state.record(RowKey::ContainerType(id), event);
            Ok(id)
        })
    }

    pub fn register_owner(&self, caller: &Principal, input: NewOwner) -> RegistryResult<u64> {
        self.mutate("register_owner", caller, |state, _now| {
            let id = state.store.create(|id| Owner::new(id, input, caller));
            let owner = state.store.get::<Owner>(id)?;
            let data = json!({
                "name": owner.name,
                "registration_number": owner.registration_number,
                "address": owner.address,
            });

            info!(owner_id = id, actor = %caller, "owner registered");
            let event = Event::record("owner_registered", EntityKind::Owner, id, data, caller);
            state.record(RowKey::Owner(id), event);
            Ok(id)
        })
    }

    /// Register a physical container against an active type and owner.
    /// The container starts `available`.
    pub fn register_container(
        &self,
        caller: &Principal,
        input: NewContainer,
    ) -> RegistryResult<u64> {
        self.mutate("register_container", caller, |state, now| {
            state
                .store
                .get_active::<ContainerType>(input.container_type_id)?;
            state.store.get_active::<Owner>(input.owner_id)?;

            if input.capacity_weight == 0 {
                return Err(RegistryError::invalid("capacity weight must be positive"));
            }
            if input.capacity_volume == 0 {
                return Err(RegistryError::invalid("capacity volume must be positive"));
            }
            ensure_storable("manufactured date", input.manufactured_date)?;
            ensure_storable("capacity weight", input.capacity_weight)?;
            ensure_storable("capacity volume", input.capacity_volume)?;
            ensure_storable("registration time", now)?;

            let data = json!({
                "container_number": input.container_number,
                "container_type_id": input.container_type_id,
                "owner_id": input.owner_id,
            });
            let id = state.store.create(|id| Container::new(id, input, now));

            info!(container_id = id, actor = %caller, "container registered");
            let event = Event::record(
                "container_registered",
                EntityKind::Container,
                id,
                data,
                caller,
            );
            state.record(RowKey::Container(id), event);
            Ok(id)
        })
    }

    // ========================================================================
    // CONTAINER LIFECYCLE
    // ========================================================================

    /// Set the status to one of the recognised values (see `ContainerStatus`)
    pub fn update_container_status(
        &self,
        caller: &Principal,
        container_id: u64,
        new_status: &str,
    ) -> RegistryResult<()> {
        self.mutate("update_container_status", caller, |state, _now| {
            let previous = state.store.get::<Container>(container_id)?.status;
            let status: ContainerStatus = new_status.parse()?;

            state
                .store
                .update::<Container, _>(container_id, |c| c.status = status)?;

            info!(container_id, from = %previous, to = %status, actor = %caller, "container status updated");
            let event = Event::record(
                "container_status_updated",
                EntityKind::Container,
                container_id,
                json!({ "from": previous, "to": status }),
                caller,
            );
            state.record(RowKey::Container(container_id), event);
            Ok(())
        })
    }

    /// Hand the container to another active owner
    pub fn transfer_ownership(
        &self,
        caller: &Principal,
        container_id: u64,
        new_owner_id: u64,
    ) -> RegistryResult<()> {
        self.mutate("transfer_ownership", caller, |state, _now| {
            let previous = state.store.get::<Container>(container_id)?.owner_id;
            state.store.get_active::<Owner>(new_owner_id)?;

            state
                .store
                .update::<Container, _>(container_id, |c| c.owner_id = new_owner_id)?;

            info!(container_id, from = previous, to = new_owner_id, actor = %caller, "container ownership transferred");
            let event = Event::record(
                "container_ownership_transferred",
                EntityKind::Container,
                container_id,
                json!({ "from": previous, "to": new_owner_id }),
                caller,
            );
            state.record(RowKey::Container(container_id), event);
            Ok(())
        })
    }

    /// Replace the container's current contents. Weight is bounded by the
    /// container's capacity; on rejection the prior contents stay as they were.
    pub fn record_contents(
        &self,
        caller: &Principal,
        container_id: u64,
        input: NewContents,
    ) -> RegistryResult<()> {
        self.mutate("record_contents", caller, |state, _now| {
            let capacity = state.store.get::<Container>(container_id)?.capacity_weight;
            if input.weight > capacity {
                return Err(RegistryError::invalid(format!(
                    "contents weight {} kg exceeds capacity {} kg",
                    input.weight, capacity
                )));
            }
            ensure_storable("value", input.value)?;
            ensure_storable("shipping date", input.shipping_date)?;

            let data = json!({
                "weight": input.weight,
                "hazardous": input.hazardous,
                "origin_country": input.origin_country,
                "destination_country": input.destination_country,
            });
            let replaced = state
                .store
                .put_contents(ContainerContents::new(container_id, input))
                .is_some();

            info!(container_id, replaced, actor = %caller, "container contents recorded");
            let event = Event::record(
                "container_contents_recorded",
                EntityKind::Contents,
                container_id,
                data,
                caller,
            );
            state.record(RowKey::Contents(container_id), event);
            Ok(())
        })
    }

    /// Stamp a new inspection. The stamp is the current clock value, bumped
    /// past the previous one when the clock has not moved. Returns the stamp.
    pub fn record_inspection(&self, caller: &Principal, container_id: u64) -> RegistryResult<u64> {
        self.mutate("record_inspection", caller, |state, now| {
            let stamp = state
                .store
                .get::<Container>(container_id)?
                .next_inspection_date(now)?;

            state
                .store
                .update::<Container, _>(container_id, |c| c.last_inspection_date = stamp)?;
            let inspection = Inspection {
                container_id,
                inspected_at: stamp,
                inspector: caller.clone(),
            };
            state.store.push_inspection(inspection.clone());
            state.new_inspections.push(inspection);

            info!(container_id, inspected_at = stamp, actor = %caller, "container inspected");
            let event = Event::record(
                "container_inspected",
                EntityKind::Container,
                container_id,
                json!({ "inspected_at": stamp }),
                caller,
            );
            state.record(RowKey::Container(container_id), event);
            Ok(stamp)
        })
    }

    // ========================================================================
    // SOFT DELETE
    // ========================================================================

    pub fn deactivate_container_type(&self, caller: &Principal, id: u64) -> RegistryResult<()> {
        self.deactivate::<ContainerType>(caller, id, RowKey::ContainerType(id))
    }

    pub fn deactivate_owner(&self, caller: &Principal, id: u64) -> RegistryResult<()> {
        self.deactivate::<Owner>(caller, id, RowKey::Owner(id))
    }

    pub fn deactivate_container(&self, caller: &Principal, id: u64) -> RegistryResult<()> {
        self.deactivate::<Container>(caller, id, RowKey::Container(id))
    }

    fn deactivate<T: Stored>(&self, caller: &Principal, id: u64, row: RowKey) -> RegistryResult<()> {
        self.mutate("deactivate", caller, |state, _now| {
            let was_active = state.store.update::<T, _>(id, |record| {
                let was_active = record.is_active();
                record.deactivate();
                was_active
            })?;

            if was_active {
                info!(kind = %T::KIND, id, actor = %caller, "deactivated");
                let event = Event::record("deactivated", T::KIND, id, json!({}), caller);
                state.record(row, event);
            }
            Ok(())
        })
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Run one write operation atomically under the state lock, gated on the
    /// registrar role. `apply` must finish all checks before its first write.
    fn mutate<R>(
        &self,
        operation: &'static str,
        caller: &Principal,
        apply: impl FnOnce(&mut RegistryState, u64) -> RegistryResult<R>,
    ) -> RegistryResult<R> {
        let mut state = write_state(&self.state);

        if let Err(err) = state.access.require(caller) {
            warn!(operation, caller = %caller, "rejected: caller is not a registrar");
            return Err(err);
        }

        let now = self.clock.now();
        apply(&mut *state, now).inspect_err(|err| {
            debug!(operation, caller = %caller, code = err.code(), error = %err, "rejected");
        })
    }
}
