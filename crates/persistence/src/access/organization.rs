//! Access-relevant state of `Organization` and `OrganizationAffiliation` resources.
//!
//! The access index only depends on a handful of fields of these two resource
//! types. This module projects a resource's JSON onto those fields so the
//! resolver can compare old and new state of a write.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::helper::organization_identifier;
use super::tag::Identifier;
use crate::error::ValidationError;

/// Resource type name of organizations.
pub const ORGANIZATION: &str = "Organization";

/// Resource type name of organization affiliations.
pub const ORGANIZATION_AFFILIATION: &str = "OrganizationAffiliation";

/// The state of an `Organization` that grants depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationState {
    /// Identifier in the organization identifier system, if any.
    pub identifier: Option<Identifier>,
    /// Whether `active` is `true`. A missing flag counts as inactive.
    pub active: bool,
}

impl OrganizationState {
    /// Projects an `Organization` resource.
    pub fn from_resource(resource: &Value) -> Self {
        Self {
            identifier: organization_identifier(resource),
            active: resource.get("active").and_then(Value::as_bool) == Some(true),
        }
    }
}

/// A role code carried by an affiliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleCode {
    /// Code system of the role.
    pub system: String,
    /// The role code.
    pub code: String,
}

impl RoleCode {
    /// Creates a role code.
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
        }
    }
}

/// The state of an `OrganizationAffiliation` that grants depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliationState {
    /// Logical id of the parent organization (`organization`).
    pub parent_organization_id: Option<String>,
    /// Logical id of the member organization (`participatingOrganization`).
    pub participating_organization_id: Option<String>,
    /// Role codes from every coding of every `code` element.
    pub roles: BTreeSet<RoleCode>,
    /// Whether `active` is `true`. A missing flag counts as inactive.
    pub active: bool,
}

impl AffiliationState {
    /// Projects an `OrganizationAffiliation` resource.
    ///
    /// Fails if a present organization reference does not point at an
    /// `Organization`.
    pub fn from_resource(resource: &Value) -> Result<Self, ValidationError> {
        let parent_organization_id = organization_reference(resource.get("organization"))?;
        let participating_organization_id =
            organization_reference(resource.get("participatingOrganization"))?;

        let roles = resource
            .get("code")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|concept| concept.get("coding").and_then(Value::as_array))
            .flatten()
            .filter_map(|coding| {
                let system = coding.get("system").and_then(Value::as_str)?;
                let code = coding.get("code").and_then(Value::as_str)?;
                Some(RoleCode::new(system, code))
            })
            .collect();

        Ok(Self {
            parent_organization_id,
            participating_organization_id,
            roles,
            active: resource.get("active").and_then(Value::as_bool) == Some(true),
        })
    }
}

/// Extracts the logical id from a `Reference` to an `Organization`.
///
/// Accepts relative (`Organization/123`), versioned
/// (`Organization/123/_history/2`) and absolute references. Contained
/// references (`#p1`) never name a stored organization and resolve to `None`.
fn organization_reference(reference: Option<&Value>) -> Result<Option<String>, ValidationError> {
    let Some(reference) = reference
        .and_then(|r| r.get("reference"))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };
    if reference.starts_with('#') {
        return Ok(None);
    }

    let mut segments = reference.trim_end_matches('/').split('/').collect::<Vec<_>>();
    if let Some(pos) = segments.iter().position(|s| *s == "_history") {
        segments.truncate(pos);
    }

    match segments.as_slice() {
        [.., resource_type, id] if *resource_type == ORGANIZATION && !id.is_empty() => {
            Ok(Some((*id).to_string()))
        }
        _ => Err(ValidationError::InvalidReference {
            reference: reference.to_string(),
            message: "expected a reference to an Organization".to_string(),
        }),
    }
}
