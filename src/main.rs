use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use container_registry::{
    db, init_logging, open_registry, persist, EntityKind, ManualClock, NewContainer,
    NewContainerType, NewContents, NewOwner, Principal, RegistryConfig, RegistryResult,
    RegistryService, SystemClock,
};

#[derive(Parser)]
#[command(name = "container-registry")]
#[command(about = "Registry for shipping containers, owners, contents and inspections", long_about = None)]
struct Cli {
    /// Config file (TOML); defaults apply when it does not exist
    #[arg(long, default_value = "registry.toml")]
    config: PathBuf,

    /// SQLite database, overrides `database.path`
    #[arg(long)]
    db: Option<PathBuf>,

    /// Authenticated identity performing write commands
    #[arg(long, env = "REGISTRY_CALLER")]
    caller: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Type,
    Owner,
    Container,
    Contents,
}

impl Kind {
    fn entity_kind(self) -> EntityKind {
        match self {
            Kind::Type => EntityKind::ContainerType,
            Kind::Owner => EntityKind::Owner,
            Kind::Container => EntityKind::Container,
            Kind::Contents => EntityKind::Contents,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Become the first registrar of an empty registry
    Init,
    /// Grant the registrar role to another identity
    AddRegistrar { address: String },
    /// Register a container type
    RegisterType {
        #[arg(long)]
        name: String,
        #[arg(long)]
        size: String,
        #[arg(long = "type")]
        kind: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Register a container owner
    RegisterOwner {
        #[arg(long)]
        name: String,
        #[arg(long)]
        registration_number: String,
        #[arg(long, default_value = "")]
        contact_info: String,
        /// Owner identity; defaults to the caller
        #[arg(long)]
        address: Option<String>,
    },
    /// Register a physical container
    RegisterContainer {
        #[arg(long)]
        number: String,
        #[arg(long)]
        type_id: u64,
        #[arg(long)]
        owner_id: u64,
        #[arg(long)]
        manufactured_date: u64,
        /// kg
        #[arg(long)]
        capacity_weight: u64,
        /// cubic metres
        #[arg(long)]
        capacity_volume: u64,
    },
    /// Change a container's status
    SetStatus { id: u64, status: String },
    /// Move a container to another owner
    Transfer { id: u64, owner_id: u64 },
    /// Replace a container's contents
    RecordContents {
        id: u64,
        #[arg(long)]
        description: String,
        #[arg(long)]
        hazardous: bool,
        #[arg(long)]
        weight: u64,
        #[arg(long, default_value_t = 0)]
        value: u64,
        #[arg(long)]
        origin: String,
        #[arg(long)]
        destination: String,
        #[arg(long)]
        shipping_date: u64,
    },
    /// Record an inspection now
    Inspect { id: u64 },
    /// Soft-delete a type, owner or container
    Deactivate { kind: Kind, id: u64 },
    /// Print one record as JSON
    Show { kind: Kind, id: u64 },
    /// Inspection history of a container
    History { id: u64 },
    /// Stored audit events for an entity
    Events { kind: Kind, id: u64 },
    /// Row counts
    Stats,
    /// Run the reference scenario against an in-memory registry
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = RegistryConfig::load_or_default(&cli.config)?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    init_logging(&config.log.level);

    match cli.command {
        Commands::Demo => run_demo(),
        command => {
            let conn = Connection::open(&config.database.path).with_context(|| {
                format!("Failed to open database {}", config.database.path.display())
            })?;
            let registry = open_registry(&conn, Arc::new(SystemClock))?;
            let caller = cli.caller.map(Principal::new);

            run(&conn, &registry, caller.as_ref(), command)?;
            // Read-only commands leave nothing to store
            persist(&conn, &registry)?;
            Ok(())
        }
    }
}

/// Surface registry failures with their stable code
fn check<T>(result: RegistryResult<T>) -> Result<T> {
    result.map_err(|e| anyhow!("{} (code {})", e, e.code()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(
    conn: &Connection,
    registry: &RegistryService,
    caller: Option<&Principal>,
    command: Commands,
) -> Result<()> {
    let query = registry.query();
    let caller = || {
        caller.ok_or_else(|| anyhow!("--caller (or REGISTRY_CALLER) is required for write commands"))
    };

    match command {
        Commands::Init => {
            let caller = caller()?;
            if check(registry.initialize(caller))? {
                println!("✓ {} is now a registrar", caller);
            } else {
                println!("✓ {} is already a registrar", caller);
            }
        }
        Commands::AddRegistrar { address } => {
            let address = Principal::new(address);
            check(registry.add_registrar(caller()?, address.clone()))?;
            println!("✓ {} is a registrar", address);
        }
        Commands::RegisterType {
            name,
            size,
            kind,
            description,
        } => {
            let input = NewContainerType {
                name,
                size,
                kind,
                description,
            };
            let id = check(registry.register_container_type(caller()?, input))?;
            println!("✓ Container type registered: id {}", id);
        }
        Commands::RegisterOwner {
            name,
            registration_number,
            contact_info,
            address,
        } => {
            let input = NewOwner {
                name,
                registration_number,
                contact_info,
                address: address.map(Principal::new),
            };
            let id = check(registry.register_owner(caller()?, input))?;
            println!("✓ Owner registered: id {}", id);
        }
        Commands::RegisterContainer {
            number,
            type_id,
            owner_id,
            manufactured_date,
            capacity_weight,
            capacity_volume,
        } => {
            let input = NewContainer {
                container_number: number,
                container_type_id: type_id,
                owner_id,
                manufactured_date,
                capacity_weight,
                capacity_volume,
            };
            let id = check(registry.register_container(caller()?, input))?;
            println!("✓ Container registered: id {}", id);
        }
        Commands::SetStatus { id, status } => {
            check(registry.update_container_status(caller()?, id, &status))?;
            println!("✓ Container {} is now {}", id, status);
        }
        Commands::Transfer { id, owner_id } => {
            check(registry.transfer_ownership(caller()?, id, owner_id))?;
            println!("✓ Container {} now belongs to owner {}", id, owner_id);
        }
        Commands::RecordContents {
            id,
            description,
            hazardous,
            weight,
            value,
            origin,
            destination,
            shipping_date,
        } => {
            let input = NewContents {
                description,
                hazardous,
                weight,
                value,
                origin_country: origin,
                destination_country: destination,
                shipping_date,
            };
            check(registry.record_contents(caller()?, id, input))?;
            println!("✓ Contents recorded for container {}", id);
        }
        Commands::Inspect { id } => {
            let stamp = check(registry.record_inspection(caller()?, id))?;
            println!("✓ Container {} inspected at {}", id, stamp);
        }
        Commands::Deactivate { kind, id } => {
            let caller = caller()?;
            match kind {
                Kind::Type => check(registry.deactivate_container_type(caller, id))?,
                Kind::Owner => check(registry.deactivate_owner(caller, id))?,
                Kind::Container => check(registry.deactivate_container(caller, id))?,
                Kind::Contents => bail!("contents cannot be deactivated; record new contents instead"),
            }
            println!("✓ {} {} deactivated", kind.entity_kind(), id);
        }
        Commands::Show { kind, id } => {
            let missing = || anyhow!("{} {} not found (code 404)", kind.entity_kind(), id);
            match kind {
                Kind::Type => print_json(&query.get_container_type(id).ok_or_else(missing)?)?,
                Kind::Owner => print_json(&query.get_owner(id).ok_or_else(missing)?)?,
                Kind::Container => {
                    let container = query.get_container(id).ok_or_else(missing)?;
                    print_json(&container)?;
                    println!(
                        "active: {}  available: {}",
                        query.is_active(id),
                        query.is_available(id)
                    );
                }
                Kind::Contents => print_json(&query.get_contents(id).ok_or_else(missing)?)?,
            }
        }
        Commands::History { id } => print_json(&query.inspection_history(id))?,
        Commands::Events { kind, id } => {
            let events = db::get_events_for_entity(conn, kind.entity_kind().tag(), &id.to_string())?;
            print_json(&events)?;
        }
        Commands::Stats => print_json(&query.stats())?,
        Commands::Demo => run_demo()?,
    }

    Ok(())
}

/// Reference scenario: type → owner → container → status → transfer → contents
fn run_demo() -> Result<()> {
    println!("🚢 Container Registry - reference scenario");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let clock = Arc::new(ManualClock::new(100100));
    let registry = RegistryService::with_clock(clock);
    let query = registry.query();
    let registrar = Principal::new("ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM");

    check(registry.initialize(&registrar))?;
    println!("✓ Registrar bootstrapped: {}", registrar);

    let type_id = check(registry.register_container_type(
        &registrar,
        NewContainerType::new(
            "Standard Dry Container",
            "40ft",
            "Dry",
            "Standard 40ft dry shipping container for general cargo",
        ),
    ))?;
    let owner_id = check(registry.register_owner(
        &registrar,
        NewOwner::new(
            "Global Shipping Co.",
            "GSC-12345",
            "contact@globalshipping.com, +1-555-123-4567",
        ),
    ))?;
    println!("✓ Container type {} and owner {} registered", type_id, owner_id);

    let container_id = check(registry.register_container(
        &registrar,
        NewContainer {
            container_number: "MSCU1234567".to_string(),
            container_type_id: type_id,
            owner_id,
            manufactured_date: 100000,
            capacity_weight: 30480,
            capacity_volume: 67,
        },
    ))?;
    println!("✓ Container {} registered", container_id);

    check(registry.update_container_status(&registrar, container_id, "in-transit"))?;

    let second_owner = check(registry.register_owner(
        &registrar,
        NewOwner::new("Pacific Freight Ltd.", "PFL-0042", "ops@pacificfreight.example"),
    ))?;
    check(registry.transfer_ownership(&registrar, container_id, second_owner))?;

    let manifest = NewContents {
        description: "Electronics and computer parts".to_string(),
        hazardous: false,
        weight: 15000,
        value: 500000,
        origin_country: "China".to_string(),
        destination_country: "United States".to_string(),
        shipping_date: 100200,
    };
    check(registry.record_contents(&registrar, container_id, manifest.clone()))?;

    let overweight = NewContents {
        weight: 40000,
        ..manifest
    };
    match registry.record_contents(&registrar, container_id, overweight) {
        Ok(()) => bail!("overweight contents were accepted"),
        Err(e) => println!("✓ Overweight contents rejected: {} (code {})", e, e.code()),
    }

    check(registry.record_inspection(&registrar, container_id))?;

    println!("\n📦 Final state");
    print_json(&query.get_container(container_id))?;
    print_json(&query.get_contents(container_id))?;
    print_json(&query.stats())?;

    Ok(())
}
