//! FHIR Read-Access Persistence Layer
//!
//! This crate stores FHIR resources and decides which of them a caller may
//! read. Access is declared on each resource through read access tags in
//! `meta.tag`, resolved on every write into a persisted access index, and
//! enforced by the database inside every search and read.
//!
//! # Features
//!
//! - **Access tags**: `ALL`, `LOCAL`, `ORGANIZATION` and `ROLE` grants
//! - **Access index**: maintained in the same transaction as the resource and
//!   kept in sync with Organization and OrganizationAffiliation changes
//! - **Filtered search**: the caller's grants compile to a SQL predicate, so
//!   totals and pages only ever cover readable resources
//! - **Versioning**: optimistic locking and soft deletes
//! - **Audit**: recomputes the index and reports drift without repairing it
//!
//! # Architecture
//!
//! - [`access`] - Tag model, tag editing helpers and the in-memory matcher
//! - [`identity`] - Caller identities
//! - [`types`] - Stored resources, search queries and pages
//! - [`error`] - Error types for all operations
//! - [`core`] - Storage traits
//! - [`backends`] - Backend implementations (SQLite)
//!
//! # Quick Start
//!
//! ```
//! use fhir_access_persistence::access::{self, Identifier, helper};
//! use fhir_access_persistence::identity::{BoundOrganization, Identity, LocalRole};
//! use serde_json::json;
//!
//! let mut task = json!({"resourceType": "Task"});
//! helper::add_local(&mut task).unwrap();
//! helper::add_organization(&mut task, "member.org").unwrap();
//!
//! assert!(access::can_read(&task, &Identity::local(LocalRole::User)));
//!
//! let member = Identity::remote(BoundOrganization::new(
//!     "org-1",
//!     Identifier::organization("member.org"),
//!     true,
//! ));
//! assert!(access::can_read(&task, &member));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod access;
pub mod backends;
pub mod core;
pub mod error;
pub mod identity;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{AccessError, StorageError, StorageResult};
pub use identity::{Identity, LocalRole};
pub use types::{Page, SearchQuery, StoredResource};

// Re-export core traits
pub use core::{
    AccessControlledSearch, AccessIndexProvider, Backend, BackendKind, ResourceStorage,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
