// 🗃️ Entity Store - Append-only-by-ID ledger
//
// One table per ID'd entity kind. IDs are sequential from 1 and never reused;
// rows are never removed (deactivation is the only "deletion").
// Contents are keyed by container ID and replaced wholesale.
// Inspections are an append-only log per container.

use crate::entities::{
    Container, ContainerContents, ContainerType, Entity, Inspection, Owner,
};
use crate::error::{RegistryError, RegistryResult};
use std::collections::BTreeMap;

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Table<T> {
    last_id: u64,
    rows: BTreeMap<u64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Table {
            last_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Entity> Table<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from persisted rows; the counter resumes after the
    /// highest stored ID.
    pub fn from_rows(rows: impl IntoIterator<Item = T>) -> Self {
        let rows: BTreeMap<u64, T> = rows.into_iter().map(|row| (row.id(), row)).collect();
        let last_id = rows.keys().next_back().copied().unwrap_or(0);

        Table { last_id, rows }
    }

    /// Allocate the next ID and store the record built for it
    pub fn insert_with(&mut self, build: impl FnOnce(u64) -> T) -> u64 {
        self.last_id += 1;
        let id = self.last_id;
        self.rows.insert(id, build(id));
        id
    }

    pub fn get(&self, id: u64) -> RegistryResult<&T> {
        self.rows
            .get(&id)
            .ok_or_else(|| RegistryError::not_found(T::KIND, id))
    }

    /// Like `get`, but inactive rows count as missing
    pub fn get_active(&self, id: u64) -> RegistryResult<&T> {
        self.get(id).and_then(|row| {
            if row.is_active() {
                Ok(row)
            } else {
                Err(RegistryError::not_found(T::KIND, id))
            }
        })
    }

    /// Apply a field-level patch to one row
    pub fn update<R>(&mut self, id: u64, patch: impl FnOnce(&mut T) -> R) -> RegistryResult<R> {
        self.rows
            .get_mut(&id)
            .map(patch)
            .ok_or_else(|| RegistryError::not_found(T::KIND, id))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in ID order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }
}

// ============================================================================
// ENTITY STORE
// ============================================================================

/// Maps an entity type to its table inside the store
pub trait Stored: Entity + Sized {
    fn table(store: &EntityStore) -> &Table<Self>;
    fn table_mut(store: &mut EntityStore) -> &mut Table<Self>;
}

impl Stored for ContainerType {
    fn table(store: &EntityStore) -> &Table<Self> {
        &store.container_types
    }

    fn table_mut(store: &mut EntityStore) -> &mut Table<Self> {
        &mut store.container_types
    }
}

impl Stored for Owner {
    fn table(store: &EntityStore) -> &Table<Self> {
        &store.owners
    }

    fn table_mut(store: &mut EntityStore) -> &mut Table<Self> {
        &mut store.owners
    }
}

impl Stored for Container {
    fn table(store: &EntityStore) -> &Table<Self> {
        &store.containers
    }

    fn table_mut(store: &mut EntityStore) -> &mut Table<Self> {
        &mut store.containers
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    container_types: Table<ContainerType>,
    owners: Table<Owner>,
    containers: Table<Container>,
    contents: BTreeMap<u64, ContainerContents>,
    inspections: BTreeMap<u64, Vec<Inspection>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        container_types: Vec<ContainerType>,
        owners: Vec<Owner>,
        containers: Vec<Container>,
        contents: Vec<ContainerContents>,
        inspections: Vec<Inspection>,
    ) -> Self {
        let mut store = EntityStore {
            container_types: Table::from_rows(container_types),
            owners: Table::from_rows(owners),
            containers: Table::from_rows(containers),
            contents: contents.into_iter().map(|c| (c.container_id, c)).collect(),
            inspections: BTreeMap::new(),
        };
        for inspection in inspections {
            store.push_inspection(inspection);
        }
        store
    }

    pub fn create<T: Stored>(&mut self, build: impl FnOnce(u64) -> T) -> u64 {
        T::table_mut(self).insert_with(build)
    }

    pub fn get<T: Stored>(&self, id: u64) -> RegistryResult<&T> {
        T::table(self).get(id)
    }

    pub fn get_active<T: Stored>(&self, id: u64) -> RegistryResult<&T> {
        T::table(self).get_active(id)
    }

    pub fn update<T: Stored, R>(
        &mut self,
        id: u64,
        patch: impl FnOnce(&mut T) -> R,
    ) -> RegistryResult<R> {
        T::table_mut(self).update(id, patch)
    }

    pub fn table<T: Stored>(&self) -> &Table<T> {
        T::table(self)
    }

    // ------------------------------------------------------------------------
    // Contents (one current record per container)
    // ------------------------------------------------------------------------

    /// Replace the container's contents, returning the previous record
    pub fn put_contents(&mut self, contents: ContainerContents) -> Option<ContainerContents> {
        self.contents.insert(contents.container_id, contents)
    }

    pub fn contents(&self, container_id: u64) -> Option<&ContainerContents> {
        self.contents.get(&container_id)
    }

    pub fn all_contents(&self) -> impl Iterator<Item = &ContainerContents> {
        self.contents.values()
    }

    // ------------------------------------------------------------------------
    // Inspection log
    // ------------------------------------------------------------------------

    pub fn push_inspection(&mut self, inspection: Inspection) {
        self.inspections
            .entry(inspection.container_id)
            .or_default()
            .push(inspection);
    }

    pub fn inspections(&self, container_id: u64) -> &[Inspection] {
        self.inspections
            .get(&container_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_inspections(&self) -> impl Iterator<Item = &Inspection> {
        self.inspections.values().flatten()
    }
}
