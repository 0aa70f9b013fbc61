//! Read access tag helper.
//!
//! Stateless functions that add, remove and read [`AccessTag`]s on a resource
//! held as JSON. Nothing here touches storage; callers persist the resource
//! afterwards.
//!
//! # Examples
//!
//! ```
//! use fhir_access_persistence::access::{helper, AccessTag, Identifier};
//! use serde_json::json;
//!
//! let mut task = json!({"resourceType": "Task", "status": "requested"});
//! helper::add_local(&mut task).unwrap();
//! helper::add_organization(&mut task, "org.com").unwrap();
//! helper::add_organization(&mut task, "org.com").unwrap();
//!
//! let tags = helper::access_tags(&task).unwrap();
//! assert_eq!(
//!     tags,
//!     vec![
//!         AccessTag::Local,
//!         AccessTag::Organization(Identifier::organization("org.com")),
//!     ]
//! );
//! ```

use serde_json::{Map, Value};

use super::tag::{AccessTag, Identifier, ORGANIZATION_IDENTIFIER_SYSTEM, RoleDescriptor};
use crate::error::{AccessError, AccessResult};

/// An organization handed to the helper, either as a resource or as the raw
/// identifier value.
#[derive(Debug, Clone, Copy)]
pub enum OrganizationRef<'a> {
    /// An `Organization` resource; its organization identifier is extracted.
    Resource(&'a Value),
    /// A raw organization identifier value.
    Identifier(&'a str),
}

impl<'a> From<&'a Value> for OrganizationRef<'a> {
    fn from(value: &'a Value) -> Self {
        OrganizationRef::Resource(value)
    }
}

impl<'a> From<&'a str> for OrganizationRef<'a> {
    fn from(value: &'a str) -> Self {
        OrganizationRef::Identifier(value)
    }
}

impl<'a> From<&'a String> for OrganizationRef<'a> {
    fn from(value: &'a String) -> Self {
        OrganizationRef::Identifier(value.as_str())
    }
}

impl OrganizationRef<'_> {
    /// Resolves the organization identifier.
    pub fn resolve(&self) -> AccessResult<Identifier> {
        match self {
            OrganizationRef::Identifier(value) if !value.trim().is_empty() => {
                Ok(Identifier::organization(*value))
            }
            OrganizationRef::Identifier(_) => Err(AccessError::invalid_argument(
                "organization identifier value is empty",
            )),
            OrganizationRef::Resource(resource) => organization_identifier(resource).ok_or_else(
                || {
                    AccessError::invalid_argument(format!(
                        "organization has no identifier with system {}",
                        ORGANIZATION_IDENTIFIER_SYSTEM
                    ))
                },
            ),
        }
    }
}

/// Extracts the organization identifier of an `Organization` resource.
pub fn organization_identifier(organization: &Value) -> Option<Identifier> {
    organization
        .get("identifier")?
        .as_array()?
        .iter()
        .filter_map(Identifier::from_json)
        .find(|identifier| identifier.system == ORGANIZATION_IDENTIFIER_SYSTEM)
}

/// Adds an `ALL` tag.
pub fn add_all(resource: &mut Value) -> AccessResult<()> {
    add_tag(resource, AccessTag::All)
}

/// Adds a `LOCAL` tag.
pub fn add_local(resource: &mut Value) -> AccessResult<()> {
    add_tag(resource, AccessTag::Local)
}

/// Adds an `ORGANIZATION` tag for the given organization.
pub fn add_organization<'a>(
    resource: &mut Value,
    organization: impl Into<OrganizationRef<'a>>,
) -> AccessResult<()> {
    let identifier = organization.into().resolve()?;
    add_tag(resource, AccessTag::Organization(identifier))
}

/// Adds a `ROLE` tag granting access to members of `parent` holding the role
/// `code_system|code`.
pub fn add_role<'a>(
    resource: &mut Value,
    parent: impl Into<OrganizationRef<'a>>,
    code_system: &str,
    code: &str,
) -> AccessResult<()> {
    let parent = parent.into().resolve()?;
    if code_system.trim().is_empty() || code.trim().is_empty() {
        return Err(AccessError::invalid_argument(
            "role code system and code must not be empty",
        ));
    }
    add_tag(
        resource,
        AccessTag::Role(RoleDescriptor::new(parent, code_system, code)),
    )
}

/// Adds a tag unless a semantically equal tag is already present.
pub fn add_tag(resource: &mut Value, tag: AccessTag) -> AccessResult<()> {
    if access_tags(resource)?.contains(&tag) {
        return Ok(());
    }

    tag_array_mut(resource)?.push(tag.to_coding());
    Ok(())
}

/// Removes every read access tag, leaving other tags untouched.
pub fn remove_all(resource: &mut Value) {
    let Some(meta) = resource.get_mut("meta").and_then(Value::as_object_mut) else {
        return;
    };

    let now_empty = match meta.get_mut("tag").and_then(Value::as_array_mut) {
        Some(tags) => {
            tags.retain(|coding| !AccessTag::is_access_tag_coding(coding));
            tags.is_empty()
        }
        None => false,
    };

    if now_empty {
        meta.remove("tag");
    }
}

/// Returns the read access tags of a resource, deduplicated, in declaration order.
///
/// Fails with `InvalidTag` if any read access coding is malformed.
pub fn access_tags(resource: &Value) -> AccessResult<Vec<AccessTag>> {
    let Some(codings) = resource
        .get("meta")
        .and_then(|m| m.get("tag"))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    let mut tags: Vec<AccessTag> = Vec::new();
    for coding in codings {
        if let Some(tag) = AccessTag::from_coding(coding)? {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    Ok(tags)
}

/// Returns `true` if the resource declares at least one read access tag.
pub fn has_access_tag(resource: &Value) -> bool {
    resource
        .get("meta")
        .and_then(|m| m.get("tag"))
        .and_then(Value::as_array)
        .is_some_and(|tags| tags.iter().any(AccessTag::is_access_tag_coding))
}

fn tag_array_mut(resource: &mut Value) -> AccessResult<&mut Vec<Value>> {
    let object = resource
        .as_object_mut()
        .ok_or_else(|| AccessError::invalid_argument("resource is not a JSON object"))?;

    let meta = object
        .entry("meta")
        .or_insert_with(|| Value::Object(Map::new()));
    let meta = meta
        .as_object_mut()
        .ok_or_else(|| AccessError::invalid_argument("resource meta is not a JSON object"))?;

    let tags = meta
        .entry("tag")
        .or_insert_with(|| Value::Array(Vec::new()));
    tags.as_array_mut()
        .ok_or_else(|| AccessError::invalid_argument("resource meta.tag is not an array"))
}
