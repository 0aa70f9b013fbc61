//! Command line configuration for the admin CLI.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FHIR_ACCESS_DATABASE` | fhir-access.db | SQLite database path |
//! | `FHIR_ACCESS_LOG_LEVEL` | info | Log level |
//! | `FHIR_ACCESS_BUSY_TIMEOUT_MS` | 5000 | SQLite busy timeout |
//! | `FHIR_ACCESS_DEFAULT_PAGE_SIZE` | 20 | Page size without `--count` |
//! | `FHIR_ACCESS_MAX_PAGE_SIZE` | 1000 | Upper bound for `--count` |

use clap::{Parser, Subcommand, ValueEnum};
use fhir_access_persistence::access::{Identifier, ORGANIZATION_IDENTIFIER_SYSTEM};
use fhir_access_persistence::backends::sqlite::SqliteBackendConfig;
use fhir_access_persistence::identity::LocalRole;

/// Admin CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "fhir-access")]
#[command(about = "Inspect and audit the FHIR read access index")]
pub struct AdminConfig {
    /// Path of the SQLite database (`:memory:` for a throwaway database).
    #[arg(long, env = "FHIR_ACCESS_DATABASE", default_value = "fhir-access.db")]
    pub database: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "FHIR_ACCESS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// SQLite busy timeout in milliseconds.
    #[arg(long, env = "FHIR_ACCESS_BUSY_TIMEOUT_MS", default_value = "5000")]
    pub busy_timeout_ms: u32,

    /// Page size of searches without `--count`.
    #[arg(long, env = "FHIR_ACCESS_DEFAULT_PAGE_SIZE", default_value = "20")]
    pub default_page_size: u32,

    /// Upper bound for `--count`.
    #[arg(long, env = "FHIR_ACCESS_MAX_PAGE_SIZE", default_value = "1000")]
    pub max_page_size: u32,

    #[command(subcommand)]
    pub command: Command,
}

/// Admin operations.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create or verify the database schema.
    Init,

    /// Recompute the access index and report drift without repairing it.
    Audit {
        /// Print the audit as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the declared tags and index rows of a resource.
    Rows {
        /// Logical id of the resource.
        resource_id: String,
    },

    /// Check whether a caller may read one resource.
    Check {
        /// Resource type.
        resource_type: String,
        /// Logical id.
        id: String,
        #[command(flatten)]
        caller: CallerArgs,
    },

    /// List the resources of a type a caller may read.
    Search {
        /// Resource type.
        resource_type: String,
        #[command(flatten)]
        caller: CallerArgs,
        /// Page size.
        #[arg(long)]
        count: Option<u32>,
        /// Number of matches to skip.
        #[arg(long)]
        offset: Option<u32>,
        /// Sort parameters, e.g. `-_lastUpdated`.
        #[arg(long)]
        sort: Vec<String>,
    },
}

/// The caller a check or search is evaluated for.
#[derive(Debug, Clone, clap::Args)]
pub struct CallerArgs {
    /// Organization identifier value of the caller.
    #[arg(long)]
    pub organization: Option<String>,

    /// Identifier system of `--organization`.
    #[arg(long, default_value = ORGANIZATION_IDENTIFIER_SYSTEM)]
    pub organization_system: String,

    /// Evaluate as a local caller with this role.
    #[arg(long, value_enum)]
    pub local: Option<LocalRoleArg>,
}

impl CallerArgs {
    /// Returns the caller's organization identifier, if given.
    pub fn identifier(&self) -> Option<Identifier> {
        self.organization
            .as_ref()
            .map(|value| Identifier::new(self.organization_system.clone(), value.clone()))
    }
}

/// Local role selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LocalRoleArg {
    /// Unrestricted local administrator.
    Admin,
    /// Plain local user.
    User,
}

impl From<LocalRoleArg> for LocalRole {
    fn from(role: LocalRoleArg) -> Self {
        match role {
            LocalRoleArg::Admin => LocalRole::Administrator,
            LocalRoleArg::User => LocalRole::User,
        }
    }
}

impl AdminConfig {
    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.trim().is_empty() {
            errors.push("Database path cannot be empty".to_string());
        }

        if self.default_page_size == 0 {
            errors.push("Default page size cannot be 0".to_string());
        }

        if self.default_page_size > self.max_page_size {
            errors.push("Default page size cannot exceed max page size".to_string());
        }

        if let Command::Check { caller, .. } | Command::Search { caller, .. } = &self.command {
            if caller.organization.is_none() && caller.local.is_none() {
                errors.push("A caller needs --organization, --local or both".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns the backend configuration.
    pub fn backend_config(&self) -> SqliteBackendConfig {
        SqliteBackendConfig {
            busy_timeout_ms: self.busy_timeout_ms,
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
            ..Default::default()
        }
    }
}
