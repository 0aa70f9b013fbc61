//! Caller identities for read-access control.
//!
//! Every read and search against the store is evaluated for an [`Identity`].
//! Local identities belong to the organization running the server; remote
//! identities act on behalf of another organization and carry the roles that
//! organization holds through active affiliations.
//!
//! # Core Types
//!
//! - [`Identity`] - Per-request caller description
//! - [`LocalRole`] - Administrator or plain user of the local organization
//! - [`BoundOrganization`] - The stored organization a caller is bound to
//! - [`OrganizationRole`] - A role held via one affiliation

mod context;
mod role;

pub use context::{Identity, IdentityKind};
pub use role::{BoundOrganization, LocalRole, OrganizationRole};
