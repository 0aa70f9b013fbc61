//! Rows of the read access index and audit findings over it.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::tag::AccessKind;
use crate::error::AccessError;

/// One resolved grant of the access index.
///
/// `organization_id` is set for `ORGANIZATION` rows (the granted
/// organization) and `ROLE` rows (the member organization).
/// `organization_affiliation_id` is set for `ROLE` rows only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessIndexRow {
    /// Logical id of the tagged resource.
    pub resource_id: String,
    /// Kind of the grant.
    pub access_type: AccessKind,
    /// Resolved organization.
    pub organization_id: Option<String>,
    /// Resolved affiliation.
    pub organization_affiliation_id: Option<String>,
}

impl AccessIndexRow {
    /// A row without organization or affiliation (`ALL`, `LOCAL`).
    pub fn unbound(resource_id: impl Into<String>, access_type: AccessKind) -> Self {
        Self {
            resource_id: resource_id.into(),
            access_type,
            organization_id: None,
            organization_affiliation_id: None,
        }
    }

    /// An `ORGANIZATION` row.
    pub fn organization(resource_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            access_type: AccessKind::Organization,
            organization_id: Some(organization_id.into()),
            organization_affiliation_id: None,
        }
    }

    /// A `ROLE` row for a member organization via an affiliation.
    pub fn role(
        resource_id: impl Into<String>,
        organization_id: impl Into<String>,
        affiliation_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            access_type: AccessKind::Role,
            organization_id: Some(organization_id.into()),
            organization_affiliation_id: Some(affiliation_id.into()),
        }
    }
}

impl fmt::Display for AccessIndexRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} org={} affiliation={}",
            self.resource_id,
            self.access_type,
            self.organization_id.as_deref().unwrap_or("-"),
            self.organization_affiliation_id.as_deref().unwrap_or("-"),
        )
    }
}

/// A discrepancy found by an index audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "finding", content = "row", rename_all = "snake_case")]
pub enum IndexFinding {
    /// Current tags and organization state grant this row, but it is absent.
    Missing(AccessIndexRow),
    /// The row exists but current tags and organization state do not grant it.
    Unexpected(AccessIndexRow),
    /// The row references a missing or deleted resource, organization or affiliation.
    Orphan(AccessIndexRow),
}

impl IndexFinding {
    /// Returns the row the finding is about.
    pub fn row(&self) -> &AccessIndexRow {
        match self {
            IndexFinding::Missing(row) | IndexFinding::Unexpected(row) | IndexFinding::Orphan(row) => {
                row
            }
        }
    }

    /// Converts the finding into an `IndexInconsistency` error.
    pub fn to_error(&self) -> AccessError {
        let message = match self {
            IndexFinding::Missing(row) => format!("missing row {}", row),
            IndexFinding::Unexpected(row) => format!("unexpected row {}", row),
            IndexFinding::Orphan(row) => format!("orphaned row {}", row),
        };
        AccessError::IndexInconsistency {
            resource_id: self.row().resource_id.clone(),
            message,
        }
    }
}

/// Result of [`verify_access_index`](crate::core::AccessIndexProvider::verify_access_index).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexAudit {
    /// Number of live resources whose rows were recomputed.
    pub resources_checked: u64,
    /// Number of rows present in the index.
    pub rows_checked: u64,
    /// Discrepancies, ordered by resource id.
    pub findings: Vec<IndexFinding>,
}

impl IndexAudit {
    /// Returns `true` if the index matches the recomputed state exactly.
    pub fn is_consistent(&self) -> bool {
        self.findings.is_empty()
    }

    /// Returns the findings as `IndexInconsistency` errors.
    pub fn errors(&self) -> Vec<AccessError> {
        self.findings.iter().map(IndexFinding::to_error).collect()
    }
}
