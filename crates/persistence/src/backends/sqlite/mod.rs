//! SQLite backend implementation.
//!
//! Stores FHIR resources together with their read access index and evaluates
//! read access inside every search and read issued on behalf of a caller.
//! It supports both in-memory databases (for tests) and file-based databases.
//!
//! # Example
//!
//! ```no_run
//! use fhir_access_persistence::backends::sqlite::SqliteBackend;
//! use fhir_access_persistence::core::{AccessControlledSearch, ResourceStorage};
//! use fhir_access_persistence::identity::{Identity, LocalRole};
//! use fhir_access_persistence::types::SearchQuery;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema()?;
//!
//! backend.create("Task", json!({
//!     "meta": {"tag": [{
//!         "system": "http://highmed.org/fhir/CodeSystem/read-access-tag",
//!         "code": "LOCAL"
//!     }]}
//! })).await?;
//!
//! let user = Identity::local(LocalRole::User);
//! let page = backend.search(&user, &SearchQuery::new("Task")).await?;
//! assert_eq!(page.total, 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! -- Current version of every resource; ids are unique across types
//! CREATE TABLE resources (
//!     id TEXT PRIMARY KEY,
//!     resource_type TEXT NOT NULL,
//!     version_id TEXT NOT NULL,
//!     data BLOB NOT NULL,
//!     created_at TEXT NOT NULL,
//!     last_updated TEXT NOT NULL,
//!     is_deleted INTEGER NOT NULL DEFAULT 0,
//!     deleted_at TEXT
//! );
//!
//! -- Projections of live Organization and OrganizationAffiliation resources
//! CREATE TABLE organizations (...);
//! CREATE TABLE organization_affiliations (...);
//! CREATE TABLE organization_affiliation_roles (...);
//!
//! -- Declared tags and the resolved index
//! CREATE TABLE read_access_tags (...);
//! CREATE TABLE read_access (
//!     resource_id TEXT NOT NULL,
//!     access_type TEXT NOT NULL,
//!     organization_id TEXT,
//!     organization_affiliation_id TEXT
//! );
//! ```

mod access_index;
mod backend;
mod projection;
mod schema;
mod search;
mod search_impl;
mod storage;

pub use access_index::{AccessResolver, ReconcileSummary};
pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use schema::SCHEMA_VERSION;
pub use search::{AccessFilterCompiler, QueryBuilder, RESOURCE_ALIAS, SqlFragment, SqlParam};
