//! Caller identity used for read-access decisions.

use super::role::{BoundOrganization, LocalRole, OrganizationRole};

/// Whether a caller belongs to the server's own organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    /// A caller of the local organization with the given role.
    Local(LocalRole),
    /// A caller authenticated on behalf of another organization.
    Remote,
}

/// The authenticated caller of a read or search request.
///
/// An `Identity` is built per request and never persisted. Remote identities
/// are always bound to an organization; their roles come from the active
/// affiliations in which that organization participates.
///
/// # Examples
///
/// ```
/// use fhir_access_persistence::access::Identifier;
/// use fhir_access_persistence::identity::{BoundOrganization, Identity, LocalRole};
///
/// let admin = Identity::local(LocalRole::Administrator);
/// assert!(admin.is_local_administrator());
///
/// let remote = Identity::remote(BoundOrganization::new(
///     "org-1",
///     Identifier::organization("org.com"),
///     true,
/// ));
/// assert!(!remote.is_local());
/// assert_eq!(remote.organization_id(), Some("org-1"));
/// ```
#[derive(Debug, Clone)]
pub struct Identity {
    kind: IdentityKind,
    organization: Option<BoundOrganization>,
    roles: Vec<OrganizationRole>,
    correlation_id: Option<String>,
}

impl Identity {
    /// Creates a local identity.
    pub fn local(role: LocalRole) -> Self {
        Self {
            kind: IdentityKind::Local(role),
            organization: None,
            roles: Vec::new(),
            correlation_id: None,
        }
    }

    /// Creates a remote identity bound to `organization`, without roles.
    pub fn remote(organization: BoundOrganization) -> Self {
        Self {
            kind: IdentityKind::Remote,
            organization: Some(organization),
            roles: Vec::new(),
            correlation_id: None,
        }
    }

    /// Binds a local identity to the local organization resource.
    pub fn with_organization(mut self, organization: BoundOrganization) -> Self {
        self.organization = Some(organization);
        self
    }

    /// Sets the roles derived from the organization's affiliations.
    pub fn with_roles(mut self, roles: Vec<OrganizationRole>) -> Self {
        let mut roles = roles;
        roles.sort();
        roles.dedup();
        self.roles = roles;
        self
    }

    /// Sets a correlation id for request tracing.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Returns the kind of this identity.
    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    /// Returns `true` for callers of the local organization.
    pub fn is_local(&self) -> bool {
        matches!(self.kind, IdentityKind::Local(_))
    }

    /// Returns `true` for local callers with unrestricted read access.
    pub fn is_local_administrator(&self) -> bool {
        matches!(self.kind, IdentityKind::Local(LocalRole::Administrator))
    }

    /// Returns the bound organization, if any.
    pub fn organization(&self) -> Option<&BoundOrganization> {
        self.organization.as_ref()
    }

    /// Returns the logical id of the bound organization, if any.
    pub fn organization_id(&self) -> Option<&str> {
        self.organization.as_ref().map(|o| o.id.as_str())
    }

    /// Returns the organization roles of this identity.
    pub fn roles(&self) -> &[OrganizationRole] {
        &self.roles
    }

    /// Returns the affiliation ids behind the roles, without duplicates.
    pub fn affiliation_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.roles.iter().map(|r| r.affiliation_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Returns the correlation id, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}
