//! Access tag value types and their `meta.tag` coding representation.
//!
//! An [`AccessTag`] is one read grant declared on a resource. Tags are stored
//! inside the resource itself as codings in `meta.tag`, identified by
//! [`READ_ACCESS_TAG_SYSTEM`]. Organization and role grants carry their
//! target in an extension on the coding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{AccessError, AccessResult};

/// Code system marking a `meta.tag` coding as a read access tag.
pub const READ_ACCESS_TAG_SYSTEM: &str = "http://highmed.org/fhir/CodeSystem/read-access-tag";

/// Extension carrying the organization identifier of an `ORGANIZATION` tag.
pub const EXTENSION_READ_ACCESS_ORGANIZATION: &str =
    "http://highmed.org/fhir/StructureDefinition/extension-read-access-organization";

/// Extension carrying the parent organization and role of a `ROLE` tag.
pub const EXTENSION_READ_ACCESS_PARENT_ORGANIZATION_ROLE: &str =
    "http://highmed.org/fhir/StructureDefinition/extension-read-access-parent-organization-role";

/// Sub-extension URL for the parent organization identifier.
pub const EXTENSION_PARENT_ORGANIZATION: &str = "parent-organization";

/// Sub-extension URL for the organization role coding.
pub const EXTENSION_ORGANIZATION_ROLE: &str = "organization-role";

/// Identifier system used for organization identifiers.
pub const ORGANIZATION_IDENTIFIER_SYSTEM: &str = "http://highmed.org/sid/organization-identifier";

/// The kind of an access grant, as stored in the `code` of the tag coding
/// and in the `access_type` column of the access index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessKind {
    /// Readable by every authenticated identity.
    All,
    /// Readable by identities of the local organization.
    Local,
    /// Readable by one specific organization.
    Organization,
    /// Readable by member organizations holding a role in a parent organization.
    Role,
}

impl AccessKind {
    /// Returns the code used in tags and index rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::All => "ALL",
            AccessKind::Local => "LOCAL",
            AccessKind::Organization => "ORGANIZATION",
            AccessKind::Role => "ROLE",
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessKind {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(AccessKind::All),
            "LOCAL" => Ok(AccessKind::Local),
            "ORGANIZATION" => Ok(AccessKind::Organization),
            "ROLE" => Ok(AccessKind::Role),
            other => Err(AccessError::invalid_tag(format!(
                "unknown read access code '{}'",
                other
            ))),
        }
    }
}

/// A system/value identifier pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier {
    /// The identifier namespace.
    pub system: String,
    /// The identifier value within the namespace.
    pub value: String,
}

impl Identifier {
    /// Creates an identifier.
    pub fn new(system: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            value: value.into(),
        }
    }

    /// Creates an organization identifier in [`ORGANIZATION_IDENTIFIER_SYSTEM`].
    pub fn organization(value: impl Into<String>) -> Self {
        Self::new(ORGANIZATION_IDENTIFIER_SYSTEM, value)
    }

    /// Reads a FHIR `Identifier` JSON object. Both system and value must be
    /// present and non-empty.
    pub fn from_json(value: &Value) -> Option<Self> {
        let system = non_empty_str(value.get("system"))?;
        let value = non_empty_str(value.get("value"))?;
        Some(Self::new(system, value))
    }

    /// Renders the identifier as a FHIR `Identifier` JSON object.
    pub fn to_json(&self) -> Value {
        json!({ "system": self.system, "value": self.value })
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.system, self.value)
    }
}

/// The role a member organization must hold in a parent organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleDescriptor {
    /// Identifier of the parent organization of the affiliation.
    pub parent_organization: Identifier,
    /// Code system of the role code.
    pub code_system: String,
    /// The role code.
    pub code: String,
}

impl RoleDescriptor {
    /// Creates a role descriptor.
    pub fn new(
        parent_organization: Identifier,
        code_system: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            parent_organization,
            code_system: code_system.into(),
            code: code.into(),
        }
    }
}

/// One read grant declared on a resource.
///
/// The enum shape enforces that an organization identifier exists exactly for
/// `Organization` tags and a role descriptor exactly for `Role` tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum AccessTag {
    /// Every identity may read.
    All,
    /// Local identities may read.
    Local,
    /// The organization with this identifier may read while it is active.
    Organization(Identifier),
    /// Members holding this role may read while the affiliation is active.
    Role(RoleDescriptor),
}

impl AccessTag {
    /// Returns the kind of this tag.
    pub fn kind(&self) -> AccessKind {
        match self {
            AccessTag::All => AccessKind::All,
            AccessTag::Local => AccessKind::Local,
            AccessTag::Organization(_) => AccessKind::Organization,
            AccessTag::Role(_) => AccessKind::Role,
        }
    }

    /// Returns `true` if the coding belongs to the read access tag system.
    pub fn is_access_tag_coding(coding: &Value) -> bool {
        coding.get("system").and_then(Value::as_str) == Some(READ_ACCESS_TAG_SYSTEM)
    }

    /// Encodes this tag as a `meta.tag` coding.
    pub fn to_coding(&self) -> Value {
        let mut coding = Map::new();

        match self {
            AccessTag::All | AccessTag::Local => {}
            AccessTag::Organization(identifier) => {
                coding.insert(
                    "extension".to_string(),
                    json!([{
                        "url": EXTENSION_READ_ACCESS_ORGANIZATION,
                        "valueIdentifier": identifier.to_json(),
                    }]),
                );
            }
            AccessTag::Role(role) => {
                coding.insert(
                    "extension".to_string(),
                    json!([{
                        "url": EXTENSION_READ_ACCESS_PARENT_ORGANIZATION_ROLE,
                        "extension": [
                            {
                                "url": EXTENSION_PARENT_ORGANIZATION,
                                "valueIdentifier": role.parent_organization.to_json(),
                            },
                            {
                                "url": EXTENSION_ORGANIZATION_ROLE,
                                "valueCoding": { "system": role.code_system, "code": role.code },
                            }
                        ],
                    }]),
                );
            }
        }

        coding.insert(
            "system".to_string(),
            Value::String(READ_ACCESS_TAG_SYSTEM.to_string()),
        );
        coding.insert(
            "code".to_string(),
            Value::String(self.kind().as_str().to_string()),
        );
        Value::Object(coding)
    }

    /// Decodes a `meta.tag` coding.
    ///
    /// Returns `Ok(None)` for codings of other systems, and `InvalidTag` for
    /// read access codings that are missing their code or their extension
    /// payload.
    pub fn from_coding(coding: &Value) -> AccessResult<Option<Self>> {
        if !Self::is_access_tag_coding(coding) {
            return Ok(None);
        }

        let code = coding
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| AccessError::invalid_tag("read access tag without code"))?;

        let tag = match code.parse::<AccessKind>()? {
            AccessKind::All => AccessTag::All,
            AccessKind::Local => AccessTag::Local,
            AccessKind::Organization => {
                let extension = find_extension(coding, EXTENSION_READ_ACCESS_ORGANIZATION)
                    .ok_or_else(|| {
                        AccessError::invalid_tag("ORGANIZATION tag without organization extension")
                    })?;
                let identifier = extension
                    .get("valueIdentifier")
                    .and_then(Identifier::from_json)
                    .ok_or_else(|| {
                        AccessError::invalid_tag(
                            "ORGANIZATION tag without organization identifier system and value",
                        )
                    })?;
                AccessTag::Organization(identifier)
            }
            AccessKind::Role => {
                let extension =
                    find_extension(coding, EXTENSION_READ_ACCESS_PARENT_ORGANIZATION_ROLE)
                        .ok_or_else(|| {
                            AccessError::invalid_tag("ROLE tag without parent organization role extension")
                        })?;
                let parent = find_extension(extension, EXTENSION_PARENT_ORGANIZATION)
                    .and_then(|e| e.get("valueIdentifier"))
                    .and_then(Identifier::from_json)
                    .ok_or_else(|| {
                        AccessError::invalid_tag("ROLE tag without parent organization identifier")
                    })?;
                let role = find_extension(extension, EXTENSION_ORGANIZATION_ROLE)
                    .and_then(|e| e.get("valueCoding"))
                    .ok_or_else(|| AccessError::invalid_tag("ROLE tag without organization role"))?;
                let code_system = non_empty_str(role.get("system"))
                    .ok_or_else(|| AccessError::invalid_tag("ROLE tag role without system"))?;
                let code = non_empty_str(role.get("code"))
                    .ok_or_else(|| AccessError::invalid_tag("ROLE tag role without code"))?;
                AccessTag::Role(RoleDescriptor::new(parent, code_system, code))
            }
        };

        Ok(Some(tag))
    }
}

impl fmt::Display for AccessTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessTag::All | AccessTag::Local => f.write_str(self.kind().as_str()),
            AccessTag::Organization(identifier) => write!(f, "ORGANIZATION({})", identifier),
            AccessTag::Role(role) => write!(
                f,
                "ROLE({}, {}|{})",
                role.parent_organization, role.code_system, role.code
            ),
        }
    }
}

fn find_extension<'a>(element: &'a Value, url: &str) -> Option<&'a Value> {
    element
        .get("extension")?
        .as_array()?
        .iter()
        .find(|e| e.get("url").and_then(Value::as_str) == Some(url))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
}
