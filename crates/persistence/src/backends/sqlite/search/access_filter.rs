//! Compiles a caller identity into a read access predicate.
//!
//! The predicate is a correlated `EXISTS` sub-query over `read_access` joined
//! on the resource id of the outer statement:
//!
//! | Identity | Predicate |
//! |----------|-----------|
//! | local administrator | `1 = 1` |
//! | local user | row with type `LOCAL` or `ALL` |
//! | remote, active organization `O` | row with type `ALL`, or `ORGANIZATION` for `O`, or `ROLE` for `O` via one of its affiliations |
//! | remote, inactive organization | row with type `ALL` |

use crate::access::AccessKind;
use crate::identity::Identity;

use super::query_builder::{SqlFragment, SqlParam};

/// Builds read access predicates for a resource table alias.
#[derive(Debug, Clone)]
pub struct AccessFilterCompiler {
    resource_alias: String,
    param_offset: usize,
}

impl AccessFilterCompiler {
    /// Creates a compiler for statements that alias `resources` as `resource_alias`.
    pub fn new(resource_alias: impl Into<String>) -> Self {
        Self {
            resource_alias: resource_alias.into(),
            param_offset: 0,
        }
    }

    /// Sets the number of parameters the outer statement binds before the
    /// predicate, so placeholders start at `?(offset + 1)`.
    pub fn with_param_offset(mut self, offset: usize) -> Self {
        self.param_offset = offset;
        self
    }

    /// Compiles the predicate for `identity`.
    pub fn compile(&self, identity: &Identity) -> SqlFragment {
        if identity.is_local_administrator() {
            return SqlFragment::new("1 = 1");
        }

        if identity.is_local() {
            return self.exists(format!(
                "ra.access_type IN ('{}', '{}')",
                AccessKind::Local,
                AccessKind::All
            ));
        }

        let all = format!("ra.access_type = '{}'", AccessKind::All);
        let Some(organization) = identity.organization().filter(|o| o.active) else {
            return self.exists(all);
        };

        let org_placeholder = format!("?{}", self.param_offset + 1);
        let mut params = vec![SqlParam::string(&organization.id)];
        let mut grants = vec![
            all,
            format!(
                "(ra.access_type = '{}' AND ra.organization_id = {})",
                AccessKind::Organization,
                org_placeholder
            ),
        ];

        let affiliation_ids = identity.affiliation_ids();
        if !affiliation_ids.is_empty() {
            let placeholders: Vec<String> = (0..affiliation_ids.len())
                .map(|i| format!("?{}", self.param_offset + 2 + i))
                .collect();
            grants.push(format!(
                "(ra.access_type = '{}' AND ra.organization_id = {} AND ra.organization_affiliation_id IN ({}))",
                AccessKind::Role,
                org_placeholder,
                placeholders.join(", ")
            ));
            params.extend(affiliation_ids.into_iter().map(SqlParam::string));
        }

        let mut fragment = self.exists(grants.join(" OR "));
        fragment.params = params;
        fragment
    }

    fn exists(&self, condition: String) -> SqlFragment {
        SqlFragment::new(format!(
            "EXISTS (SELECT 1 FROM read_access ra WHERE ra.resource_id = {}.id AND ({}))",
            self.resource_alias, condition
        ))
    }
}
