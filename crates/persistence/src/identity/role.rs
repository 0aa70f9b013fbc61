//! Roles and organization bindings of a caller.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::access::{Identifier, RoleCode};

/// Role of a caller from the server's own organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalRole {
    /// Unrestricted read access, including untagged resources.
    Administrator,
    /// Reads resources tagged `LOCAL` or `ALL`.
    User,
}

impl fmt::Display for LocalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalRole::Administrator => write!(f, "administrator"),
            LocalRole::User => write!(f, "user"),
        }
    }
}

/// The stored organization a caller is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundOrganization {
    /// Logical id of the `Organization` resource.
    pub id: String,
    /// The organization identifier.
    pub identifier: Identifier,
    /// Whether the organization is currently active.
    pub active: bool,
}

impl BoundOrganization {
    /// Creates a binding.
    pub fn new(id: impl Into<String>, identifier: Identifier, active: bool) -> Self {
        Self {
            id: id.into(),
            identifier,
            active,
        }
    }
}

/// A role the caller's organization holds through an active affiliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrganizationRole {
    /// Logical id of the `OrganizationAffiliation` granting the role.
    pub affiliation_id: String,
    /// Identifier of the affiliation's parent organization.
    pub parent_organization: Identifier,
    /// The role code.
    pub role: RoleCode,
}

impl OrganizationRole {
    /// Creates an organization role.
    pub fn new(
        affiliation_id: impl Into<String>,
        parent_organization: Identifier,
        role: RoleCode,
    ) -> Self {
        Self {
            affiliation_id: affiliation_id.into(),
            parent_organization,
            role,
        }
    }
}
