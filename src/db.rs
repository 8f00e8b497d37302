// 💾 Storage - SQLite persistence for the registry
//
// The registry core is storage-agnostic; this module is its storage collaborator.
// Each save upserts only the rows changed since the last one, together with
// their audit events, inside one transaction. A failed save rolls the in-memory
// registry back to what is stored.

use crate::access::Principal;
use crate::clock::Clock;
use crate::entities::{Container, ContainerContents, ContainerStatus, ContainerType, Inspection, Owner};
use crate::events::Event;
use crate::registry::{ChangeSet, RegistryService, RegistrySnapshot};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// A save that did not reach the database
#[derive(Error, Debug)]
pub enum PersistError {
    /// Nothing was stored and the registry was reloaded from the database
    #[error("registry changes were not stored and have been rolled back: {0:#}")]
    RolledBack(anyhow::Error),

    /// Nothing was stored and reloading failed; memory is ahead of the database
    #[error("registry changes were not stored and the stored state could not be reloaded: {0:#}")]
    Diverged(anyhow::Error),
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS registrars (
            address TEXT PRIMARY KEY NOT NULL
        );

        CREATE TABLE IF NOT EXISTS container_types (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            size TEXT NOT NULL,
            type TEXT NOT NULL,
            description TEXT NOT NULL,
            active INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS owners (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            registration_number TEXT NOT NULL,
            contact_info TEXT NOT NULL,
            active INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS containers (
            id INTEGER PRIMARY KEY,
            container_number TEXT NOT NULL,
            container_type_id INTEGER NOT NULL REFERENCES container_types(id),
            owner_id INTEGER NOT NULL REFERENCES owners(id),
            manufactured_date INTEGER NOT NULL,
            last_inspection_date INTEGER NOT NULL,
            capacity_weight INTEGER NOT NULL,
            capacity_volume INTEGER NOT NULL,
            status TEXT NOT NULL,
            active INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS contents (
            container_id INTEGER PRIMARY KEY REFERENCES containers(id),
            description TEXT NOT NULL,
            hazardous INTEGER NOT NULL,
            weight INTEGER NOT NULL,
            value INTEGER NOT NULL,
            origin_country TEXT NOT NULL,
            destination_country TEXT NOT NULL,
            shipping_date INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS inspections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container_id INTEGER NOT NULL REFERENCES containers(id),
            inspected_at INTEGER NOT NULL,
            inspector TEXT NOT NULL
        );

        -- Audit trail
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_containers_owner ON containers(owner_id);
        CREATE INDEX IF NOT EXISTS idx_inspections_container ON inspections(container_id);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);",
    )?;

    Ok(())
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Replace the stored registry state with `snapshot`
pub fn save_snapshot(conn: &Connection, snapshot: &RegistrySnapshot) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    write_snapshot(&tx, snapshot)?;
    tx.commit()?;
    Ok(())
}

fn write_snapshot(conn: &Connection, snapshot: &RegistrySnapshot) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM inspections;
         DELETE FROM contents;
         DELETE FROM containers;
         DELETE FROM owners;
         DELETE FROM container_types;
         DELETE FROM registrars;",
    )?;

    for registrar in &snapshot.registrars {
        conn.execute(
            "INSERT INTO registrars (address) VALUES (?1)",
            params![registrar.as_str()],
        )?;
    }
    for t in &snapshot.container_types {
        upsert_container_type(conn, t)?;
    }
    for o in &snapshot.owners {
        upsert_owner(conn, o)?;
    }
    for c in &snapshot.containers {
        upsert_container(conn, c)?;
    }
    for c in &snapshot.contents {
        upsert_contents(conn, c)?;
    }
    for i in &snapshot.inspections {
        insert_inspection(conn, i)?;
    }

    Ok(())
}

// ----------------------------------------------------------------------------
// Row writers
// ----------------------------------------------------------------------------

fn upsert_container_type(conn: &Connection, t: &ContainerType) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO container_types (id, name, size, type, description, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![t.id, t.name, t.size, t.kind, t.description, t.active],
    )
    .with_context(|| format!("Failed to store container type {}", t.id))?;
    Ok(())
}

fn upsert_owner(conn: &Connection, o: &Owner) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO owners (id, name, address, registration_number, contact_info, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            o.id,
            o.name,
            o.address.as_str(),
            o.registration_number,
            o.contact_info,
            o.active
        ],
    )
    .with_context(|| format!("Failed to store owner {}", o.id))?;
    Ok(())
}

fn upsert_container(conn: &Connection, c: &Container) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO containers (
            id, container_number, container_type_id, owner_id, manufactured_date,
            last_inspection_date, capacity_weight, capacity_volume, status, active
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            c.id,
            c.container_number,
            c.container_type_id,
            c.owner_id,
            c.manufactured_date,
            c.last_inspection_date,
            c.capacity_weight,
            c.capacity_volume,
            c.status.as_str(),
            c.active,
        ],
    )
    .with_context(|| format!("Failed to store container {}", c.id))?;
    Ok(())
}

fn upsert_contents(conn: &Connection, c: &ContainerContents) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO contents (
            container_id, description, hazardous, weight, value,
            origin_country, destination_country, shipping_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            c.container_id,
            c.description,
            c.hazardous,
            c.weight,
            c.value,
            c.origin_country,
            c.destination_country,
            c.shipping_date,
        ],
    )
    .with_context(|| format!("Failed to store contents of container {}", c.container_id))?;
    Ok(())
}

fn insert_inspection(conn: &Connection, i: &Inspection) -> Result<()> {
    conn.execute(
        "INSERT INTO inspections (container_id, inspected_at, inspector) VALUES (?1, ?2, ?3)",
        params![i.container_id, i.inspected_at, i.inspector.as_str()],
    )
    .with_context(|| format!("Failed to store inspection of container {}", i.container_id))?;
    Ok(())
}

pub fn load_snapshot(conn: &Connection) -> Result<RegistrySnapshot> {
    let registrars = conn
        .prepare("SELECT address FROM registrars ORDER BY address")?
        .query_map([], |row| Ok(Principal::new(row.get::<_, String>(0)?)))?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to load registrars")?;

    let container_types = conn
        .prepare("SELECT id, name, size, type, description, active FROM container_types ORDER BY id")?
        .query_map([], |row| {
            Ok(ContainerType {
                id: row.get(0)?,
                name: row.get(1)?,
                size: row.get(2)?,
                kind: row.get(3)?,
                description: row.get(4)?,
                active: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to load container types")?;

    let owners = conn
        .prepare(
            "SELECT id, name, address, registration_number, contact_info, active
             FROM owners ORDER BY id",
        )?
        .query_map([], |row| {
            Ok(Owner {
                id: row.get(0)?,
                name: row.get(1)?,
                address: Principal::new(row.get::<_, String>(2)?),
                registration_number: row.get(3)?,
                contact_info: row.get(4)?,
                active: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to load owners")?;

    let containers = conn
        .prepare(
            "SELECT id, container_number, container_type_id, owner_id, manufactured_date,
                    last_inspection_date, capacity_weight, capacity_volume, status, active
             FROM containers ORDER BY id",
        )?
        .query_map([], |row| {
            let status: String = row.get(8)?;
            let status = status.parse::<ContainerStatus>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e))
            })?;

            Ok(Container {
                id: row.get(0)?,
                container_number: row.get(1)?,
                container_type_id: row.get(2)?,
                owner_id: row.get(3)?,
                manufactured_date: row.get(4)?,
                last_inspection_date: row.get(5)?,
                capacity_weight: row.get(6)?,
                capacity_volume: row.get(7)?,
                status,
                active: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to load containers")?;

    let contents = conn
        .prepare(
            "SELECT container_id, description, hazardous, weight, value,
                    origin_country, destination_country, shipping_date
             FROM contents ORDER BY container_id",
        )?
        .query_map([], |row| {
            Ok(ContainerContents {
                container_id: row.get(0)?,
                description: row.get(1)?,
                hazardous: row.get(2)?,
                weight: row.get(3)?,
                value: row.get(4)?,
                origin_country: row.get(5)?,
                destination_country: row.get(6)?,
                shipping_date: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to load contents")?;

    let inspections = conn
        .prepare("SELECT container_id, inspected_at, inspector FROM inspections ORDER BY id")?
        .query_map([], |row| {
            Ok(Inspection {
                container_id: row.get(0)?,
                inspected_at: row.get(1)?,
                inspector: Principal::new(row.get::<_, String>(2)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to load inspections")?;

    Ok(RegistrySnapshot {
        registrars,
        container_types,
        owners,
        containers,
        contents,
        inspections,
    })
}

/// Prepare the schema and rebuild a registry from whatever is stored
pub fn open_registry(conn: &Connection, clock: Arc<dyn Clock>) -> Result<RegistryService> {
    setup_database(conn)?;
    let snapshot = load_snapshot(conn)?;
    debug!(
        containers = snapshot.containers.len(),
        owners = snapshot.owners.len(),
        "registry loaded"
    );
    Ok(RegistryService::from_snapshot(snapshot, clock))
}

/// Store everything committed since the last save. Returns the number of
/// audit events written.
///
/// On failure the registry is reset to the stored state, so reads never show
/// data the database does not hold.
pub fn persist(conn: &Connection, registry: &RegistryService) -> Result<usize, PersistError> {
    let changes = registry.take_changes();
    if changes.is_empty() {
        return Ok(0);
    }

    match write_changes(conn, &changes) {
        Ok(()) => {
            debug!(
                events = changes.events.len(),
                containers = changes.containers.len(),
                "registry changes stored"
            );
            Ok(changes.events.len())
        }
        Err(err) => {
            warn!("Failed to store registry changes, reloading: {:#}", err);
            match load_snapshot(conn) {
                Ok(snapshot) => {
                    registry.restore(snapshot);
                    Err(PersistError::RolledBack(err))
                }
                Err(reload) => Err(PersistError::Diverged(
                    reload.context(format!("after failed save: {err:#}")),
                )),
            }
        }
    }
}

fn write_changes(conn: &Connection, changes: &ChangeSet) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    for registrar in &changes.registrars {
        tx.execute(
            "INSERT OR IGNORE INTO registrars (address) VALUES (?1)",
            params![registrar.as_str()],
        )?;
    }
    for t in &changes.container_types {
        upsert_container_type(&tx, t)?;
    }
    for o in &changes.owners {
        upsert_owner(&tx, o)?;
    }
    for c in &changes.containers {
        upsert_container(&tx, c)?;
    }
    for c in &changes.contents {
        upsert_contents(&tx, c)?;
    }
    for i in &changes.inspections {
        insert_inspection(&tx, i)?;
    }
    for event in &changes.events {
        insert_event(&tx, event)?;
    }

    tx.commit().context("Failed to commit registry changes")?;
    Ok(())
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn count_events(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;

    Ok(count)
}
