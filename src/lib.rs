// Container Registry - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod access;
pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod events;
pub mod query;
pub mod registry;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use access::{AccessControl, Principal};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{init_logging, RegistryConfig};
pub use db::{
    get_events_for_entity, insert_event, load_snapshot, open_registry, persist, save_snapshot,
    setup_database, PersistError,
};
pub use entities::{
    Container, ContainerContents, ContainerStatus, ContainerType, EntityKind, Inspection,
    NewContainer, NewContainerType, NewContents, NewOwner, Owner, MAX_STORED_INT,
};
pub use error::{ErrorKind, RegistryError, RegistryResult};
pub use events::Event;
pub use query::{QueryService, RegistryStats};
pub use registry::{ChangeSet, RegistryService, RegistrySnapshot};
pub use store::{EntityStore, Table};
