//! Test fixtures for read access testing.
//!
//! Builders for Organization and OrganizationAffiliation resources and for
//! resources carrying read access tags.

use serde_json::{Value, json};

use fhir_access_persistence::access::{ORGANIZATION_IDENTIFIER_SYSTEM, helper};
use fhir_access_persistence::backends::sqlite::SqliteBackend;

/// Code system of the role codes used in tests.
pub const ROLE_SYSTEM: &str = "http://highmed.org/fhir/CodeSystem/organization-role";

/// Creates an in-memory backend with an initialized schema.
pub fn create_backend() -> SqliteBackend {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    backend
}

/// An Organization fixture.
#[derive(Debug, Clone)]
pub struct OrganizationFixture {
    /// Logical id.
    pub id: String,
    /// Organization identifier value.
    pub identifier: Option<String>,
    /// Whether the organization is active.
    pub active: bool,
}

impl OrganizationFixture {
    /// Creates an active organization with an identifier.
    pub fn new(id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            identifier: Some(identifier.into()),
            active: true,
        }
    }

    /// Sets active status.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Converts to FHIR JSON.
    pub fn to_json(&self) -> Value {
        let mut organization = json!({
            "resourceType": "Organization",
            "id": self.id,
            "active": self.active,
        });
        if let Some(identifier) = &self.identifier {
            organization["identifier"] = json!([{
                "system": ORGANIZATION_IDENTIFIER_SYSTEM,
                "value": identifier
            }]);
        }
        organization
    }
}

/// An OrganizationAffiliation fixture.
#[derive(Debug, Clone)]
pub struct AffiliationFixture {
    /// Logical id.
    pub id: String,
    /// Logical id of the parent organization.
    pub parent: String,
    /// Logical id of the member organization.
    pub member: String,
    /// Role codes in [`ROLE_SYSTEM`].
    pub roles: Vec<String>,
    /// Whether the affiliation is active.
    pub active: bool,
}

impl AffiliationFixture {
    /// Creates an active affiliation without roles.
    pub fn new(id: impl Into<String>, parent: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: parent.into(),
            member: member.into(),
            roles: vec![],
            active: true,
        }
    }

    /// Adds a role code.
    pub fn with_role(mut self, code: impl Into<String>) -> Self {
        self.roles.push(code.into());
        self
    }

    /// Replaces all role codes.
    pub fn with_roles(mut self, codes: &[&str]) -> Self {
        self.roles = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Sets active status.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Converts to FHIR JSON.
    pub fn to_json(&self) -> Value {
        let codes: Vec<Value> = self
            .roles
            .iter()
            .map(|code| json!({"coding": [{"system": ROLE_SYSTEM, "code": code}]}))
            .collect();
        json!({
            "resourceType": "OrganizationAffiliation",
            "id": self.id,
            "active": self.active,
            "organization": {"reference": format!("Organization/{}", self.parent)},
            "participatingOrganization": {"reference": format!("Organization/{}", self.member)},
            "code": codes
        })
    }
}

/// A Task without any tags.
pub fn task(id: &str) -> Value {
    json!({
        "resourceType": "Task",
        "id": id,
        "status": "requested",
        "intent": "order"
    })
}

/// A Task tagged `ALL`.
pub fn task_for_all(id: &str) -> Value {
    let mut resource = task(id);
    helper::add_all(&mut resource).expect("ALL tag");
    resource
}

/// A Task tagged `LOCAL`.
pub fn local_task(id: &str) -> Value {
    let mut resource = task(id);
    helper::add_local(&mut resource).expect("LOCAL tag");
    resource
}

/// A Task tagged `ORGANIZATION` for each identifier.
pub fn task_for_organizations(id: &str, identifiers: &[&str]) -> Value {
    let mut resource = task(id);
    for identifier in identifiers {
        helper::add_organization(&mut resource, *identifier).expect("ORGANIZATION tag");
    }
    resource
}

/// A Task tagged `ROLE` for members of `parent` holding `code`.
pub fn task_for_role(id: &str, parent: &str, code: &str) -> Value {
    let mut resource = task(id);
    helper::add_role(&mut resource, parent, ROLE_SYSTEM, code).expect("ROLE tag");
    resource
}
