//! FHIR read access admin CLI.
//!
//! Opens the SQLite store and inspects the read access index: schema setup,
//! audits, per-resource rows and read checks for a caller.

mod config;

use clap::Parser;
use tracing::info;

use config::{AdminConfig, CallerArgs, Command};
use fhir_access_persistence::backends::sqlite::SqliteBackend;
use fhir_access_persistence::core::{AccessControlledSearch, AccessIndexProvider};
use fhir_access_persistence::error::{AccessError, StorageError};
use fhir_access_persistence::identity::Identity;
use fhir_access_persistence::types::{SearchQuery, SortDirective};

/// Installs the `fmt` subscriber, honouring `RUST_LOG` when set.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "fhir_access={level},fhir_access_persistence={level},fhir_access_admin={level}"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Opens the database and makes sure the schema is current.
fn open_backend(config: &AdminConfig) -> anyhow::Result<SqliteBackend> {
    info!(database = %config.database, "Opening SQLite backend");
    let backend = SqliteBackend::with_config(&config.database, config.backend_config())?;
    backend.init_schema()?;
    Ok(backend)
}

/// Builds the caller identity described on the command line.
async fn resolve_caller(backend: &SqliteBackend, caller: &CallerArgs) -> anyhow::Result<Identity> {
    let local = caller.local.map(Into::into);
    match caller.identifier() {
        Some(identifier) => backend
            .resolve_identity(&identifier, local)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No organization with identifier {}", identifier)),
        None => match local {
            Some(role) => Ok(Identity::local(role)),
            None => anyhow::bail!("A caller needs --organization, --local or both"),
        },
    }
}

async fn run(config: AdminConfig) -> anyhow::Result<bool> {
    let backend = open_backend(&config)?;

    match config.command {
        Command::Init => {
            println!("schema version {}", backend.schema_version()?);
        }
        Command::Audit { json } => {
            let audit = backend.verify_access_index().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&audit)?);
            } else {
                println!(
                    "checked {} resources and {} rows",
                    audit.resources_checked, audit.rows_checked
                );
                for error in audit.errors() {
                    println!("{}", error);
                }
            }
            return Ok(audit.is_consistent());
        }
        Command::Rows { resource_id } => {
            for tag in backend.declared_access_tags(&resource_id).await? {
                println!("tag {}", tag);
            }
            for row in backend.read_access_rows(&resource_id).await? {
                println!("row {}", row);
            }
        }
        Command::Check {
            resource_type,
            id,
            caller,
        } => {
            let identity = resolve_caller(&backend, &caller).await?;
            match backend.read_as(&identity, &resource_type, &id).await {
                Ok(resource) => println!("readable {}", resource.versioned_url()),
                Err(StorageError::Access(AccessError::AuthorizationDenied { .. })) => {
                    println!("denied {}/{}", resource_type, id);
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Search {
            resource_type,
            caller,
            count,
            offset,
            sort,
        } => {
            let identity = resolve_caller(&backend, &caller).await?;
            let mut query = SearchQuery::new(resource_type);
            for parameter in &sort {
                query = query.with_sort(SortDirective::parse(parameter));
            }
            query.count = count;
            query.offset = offset;

            let page = backend.search(&identity, &query).await?;
            for resource in &page.items {
                println!("{}", resource.url());
            }
            println!(
                "{} of {} (offset {})",
                page.len(),
                page.total,
                page.offset
            );
        }
    }

    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AdminConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    if !run(config).await? {
        std::process::exit(2);
    }
    Ok(())
}
