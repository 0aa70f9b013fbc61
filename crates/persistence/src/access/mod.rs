//! Tag-driven read-access control.
//!
//! Resources declare who may read them through read access tags in
//! `meta.tag`. A resource is readable if ANY of its tags is satisfied:
//!
//! | Tag | Readable by |
//! |-----|-------------|
//! | `ALL` | every identity |
//! | `LOCAL` | identities of the local organization |
//! | `ORGANIZATION` | the named organization, while active |
//! | `ROLE` | members of an active affiliation with the parent organization holding the role code, while parent and member are active |
//!
//! Local administrators read everything. Untagged resources are readable by
//! nobody else.
//!
//! # Modules
//!
//! - [`tag`] - Tag value types and their coding representation
//! - [`helper`] - Add, remove and read tags on a resource
//! - [`matcher`] - In-memory evaluation of tags for an identity
//! - [`organization`] - Access-relevant state of organizations and affiliations
//! - [`index`] - Rows of the access index and audit findings
//!
//! Maintenance of the persisted index and the SQL filter live in the storage
//! backends.

pub mod helper;
pub mod index;
pub mod matcher;
pub mod organization;
pub mod tag;

pub use helper::OrganizationRef;
pub use index::{AccessIndexRow, IndexAudit, IndexFinding};
pub use matcher::{can_read, matches};
pub use organization::{AffiliationState, OrganizationState, RoleCode};
pub use tag::{
    AccessKind, AccessTag, Identifier, ORGANIZATION_IDENTIFIER_SYSTEM, READ_ACCESS_TAG_SYSTEM,
    RoleDescriptor,
};
