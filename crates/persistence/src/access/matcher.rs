//! In-memory read-access decisions.
//!
//! Evaluates the same rules as the compiled SQL filter, but against the tags
//! of a resource that is already in memory. This is used where the access
//! index cannot reflect the resource yet, e.g. for a resource written earlier
//! in the same transaction.

use serde_json::Value;

use super::tag::AccessTag;
use crate::identity::Identity;

/// Returns `true` if any of `tags` grants read access to `identity`.
///
/// Local administrators may read everything, including untagged resources.
/// Everyone else needs a satisfied tag, so an empty tag set denies.
pub fn matches(tags: &[AccessTag], identity: &Identity) -> bool {
    if identity.is_local_administrator() {
        return true;
    }

    tags.iter().any(|tag| grants(tag, identity))
}

/// Returns `true` if `identity` may read `resource`.
///
/// Malformed read access codings are skipped with a warning and the remaining
/// tags are evaluated, the same way the access index resolves them.
pub fn can_read(resource: &Value, identity: &Identity) -> bool {
    if identity.is_local_administrator() {
        return true;
    }

    matches(&well_formed_tags(resource), identity)
}

fn well_formed_tags(resource: &Value) -> Vec<AccessTag> {
    let Some(codings) = resource
        .get("meta")
        .and_then(|m| m.get("tag"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    codings
        .iter()
        .filter_map(|coding| match AccessTag::from_coding(coding) {
            Ok(tag) => tag,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed read access tag");
                None
            }
        })
        .collect()
}

fn grants(tag: &AccessTag, identity: &Identity) -> bool {
    match tag {
        AccessTag::All => true,
        AccessTag::Local => identity.is_local(),
        AccessTag::Organization(identifier) => {
            if identity.is_local() {
                return false;
            }
            identity
                .organization()
                .is_some_and(|org| org.active && &org.identifier == identifier)
        }
        AccessTag::Role(role) => {
            if identity.is_local() {
                return false;
            }
            let Some(org) = identity.organization() else {
                return false;
            };
            org.active
                && identity.roles().iter().any(|held| {
                    held.parent_organization == role.parent_organization
                        && held.role.system == role.code_system
                        && held.role.code == role.code
                })
        }
    }
}
