//! Maintenance of the read access index.
//!
//! [`AccessResolver`] derives the `read_access` rows of a resource from its
//! declared tags (`read_access_tags`) and the current organization and
//! affiliation projections. Every write path calls it on the connection of
//! its open transaction, so the index commits or rolls back together with the
//! write that changed it.
//!
//! Reconciliation is a minimal diff: the desired row set is recomputed from
//! current state, rows that are no longer granted are deleted and missing
//! rows are inserted. Running it twice changes nothing.

use std::collections::BTreeSet;

use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::access::{
    AccessIndexRow, AccessKind, AccessTag, AffiliationState, Identifier, IndexAudit,
    IndexFinding, OrganizationState, RoleDescriptor,
};
use crate::error::{AccessError, AccessResult, StorageError, StorageResult};

/// Active member organizations and affiliations granting a role of an active
/// parent organization.
const ROLE_GRANTS_SQL: &str = "
    SELECT member.organization_id, a.affiliation_id
    FROM organization_affiliations a
    JOIN organizations parent ON parent.organization_id = a.parent_organization_id
    JOIN organizations member ON member.organization_id = a.participating_organization_id
    JOIN organization_affiliation_roles role ON role.affiliation_id = a.affiliation_id
    WHERE a.active = 1
      AND parent.active = 1
      AND member.active = 1
      AND parent.identifier_system = ?1
      AND parent.identifier_value = ?2
      AND role.code_system = ?3
      AND role.code = ?4
    ORDER BY member.organization_id, a.affiliation_id";

/// Resources with a ROLE tag naming the parent of an affiliation the
/// organization participates in.
const MEMBER_ROLE_TAGS_SQL: &str = "
    SELECT DISTINCT t.resource_id
    FROM read_access_tags t
    JOIN organizations parent
      ON parent.identifier_system = t.organization_system
     AND parent.identifier_value = t.organization_value
    JOIN organization_affiliations a ON a.parent_organization_id = parent.organization_id
    WHERE t.access_type = 'ROLE' AND a.participating_organization_id = ?1";

/// Resources with a ROLE tag naming the given parent organization.
const PARENT_ROLE_TAGS_SQL: &str = "
    SELECT DISTINCT t.resource_id
    FROM read_access_tags t
    JOIN organizations parent
      ON parent.identifier_system = t.organization_system
     AND parent.identifier_value = t.organization_value
    WHERE t.access_type = 'ROLE' AND parent.organization_id = ?1";

/// Number of index rows changed by a reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Rows inserted.
    pub inserted: usize,
    /// Rows deleted.
    pub removed: usize,
}

impl ReconcileSummary {
    fn merge(&mut self, other: ReconcileSummary) {
        self.inserted += other.inserted;
        self.removed += other.removed;
    }
}

/// Keeps `read_access` consistent with declared tags and organization state.
pub struct AccessResolver<'c> {
    conn: &'c Connection,
}

impl<'c> AccessResolver<'c> {
    /// Creates a resolver working on `conn`, normally an open transaction.
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Replaces the declared tags of a resource and reconciles its rows.
    pub fn on_resource_write(
        &self,
        resource_id: &str,
        tags: &[AccessTag],
    ) -> StorageResult<ReconcileSummary> {
        self.replace_declared_tags(resource_id, tags)?;
        self.reconcile(resource_id)
    }

    /// Removes every declared tag and index row of a deleted resource.
    pub fn on_resource_delete(&self, resource_id: &str) -> StorageResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM read_access WHERE resource_id = ?1",
            params![resource_id],
        )?;
        self.conn.execute(
            "DELETE FROM read_access_tags WHERE resource_id = ?1",
            params![resource_id],
        )?;
        tracing::debug!(resource_id, removed, "Removed read access of deleted resource");
        Ok(removed)
    }

    /// Reconciles every resource whose rows may depend on an organization.
    ///
    /// Must run after the organization projection holds `new`.
    pub fn on_organization_change(
        &self,
        organization_id: &str,
        old: Option<&OrganizationState>,
        new: Option<&OrganizationState>,
    ) -> StorageResult<ReconcileSummary> {
        if old == new {
            tracing::debug!(organization_id, "Organization access state unchanged");
            return Ok(ReconcileSummary::default());
        }

        let mut affected = BTreeSet::new();
        self.collect_ids(
            &mut affected,
            "SELECT DISTINCT resource_id FROM read_access WHERE organization_id = ?1",
            params![organization_id],
        )?;

        let identifiers: BTreeSet<&Identifier> = [old, new]
            .into_iter()
            .flatten()
            .filter_map(|state| state.identifier.as_ref())
            .collect();
        for identifier in identifiers {
            self.collect_ids(
                &mut affected,
                "SELECT DISTINCT resource_id FROM read_access_tags
                 WHERE access_type IN ('ORGANIZATION', 'ROLE')
                   AND organization_system = ?1 AND organization_value = ?2",
                params![identifier.system, identifier.value],
            )?;
        }

        self.collect_ids(&mut affected, MEMBER_ROLE_TAGS_SQL, params![organization_id])?;

        let summary = self.reconcile_all(&affected)?;
        tracing::debug!(
            organization_id,
            resources = affected.len(),
            inserted = summary.inserted,
            removed = summary.removed,
            "Reconciled read access after organization change"
        );
        Ok(summary)
    }

    /// Reconciles every resource whose rows may depend on an affiliation.
    ///
    /// Must run after the affiliation projection holds `new`.
    pub fn on_affiliation_change(
        &self,
        affiliation_id: &str,
        old: Option<&AffiliationState>,
        new: Option<&AffiliationState>,
    ) -> StorageResult<ReconcileSummary> {
        if old == new {
            tracing::debug!(affiliation_id, "Affiliation access state unchanged");
            return Ok(ReconcileSummary::default());
        }

        let mut affected = BTreeSet::new();
        self.collect_ids(
            &mut affected,
            "SELECT DISTINCT resource_id FROM read_access WHERE organization_affiliation_id = ?1",
            params![affiliation_id],
        )?;

        let parents: BTreeSet<&str> = [old, new]
            .into_iter()
            .flatten()
            .filter_map(|state| state.parent_organization_id.as_deref())
            .collect();
        for parent in parents {
            self.collect_ids(&mut affected, PARENT_ROLE_TAGS_SQL, params![parent])?;
        }

        let summary = self.reconcile_all(&affected)?;
        tracing::debug!(
            affiliation_id,
            resources = affected.len(),
            inserted = summary.inserted,
            removed = summary.removed,
            "Reconciled read access after affiliation change"
        );
        Ok(summary)
    }

    /// Brings the rows of one resource in line with its desired row set.
    pub fn reconcile(&self, resource_id: &str) -> StorageResult<ReconcileSummary> {
        let desired = self.desired_rows(resource_id)?;
        let existing = self.existing_rows(resource_id)?;

        let mut summary = ReconcileSummary::default();
        for row in existing.difference(&desired) {
            self.delete_row(row)?;
            summary.removed += 1;
        }
        for row in desired.difference(&existing) {
            self.insert_row(row)?;
            summary.inserted += 1;
        }

        if summary != ReconcileSummary::default() {
            tracing::debug!(
                resource_id,
                inserted = summary.inserted,
                removed = summary.removed,
                "Reconciled read access rows"
            );
        }
        Ok(summary)
    }

    fn reconcile_all(&self, resource_ids: &BTreeSet<String>) -> StorageResult<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        for resource_id in resource_ids {
            summary.merge(self.reconcile(resource_id)?);
        }
        Ok(summary)
    }

    /// Returns the declared tags of a resource.
    ///
    /// Stored tags that no longer parse are skipped with a warning.
    pub fn declared_tags(&self, resource_id: &str) -> StorageResult<Vec<AccessTag>> {
        let mut stmt = self.conn.prepare(
            "SELECT access_type, organization_system, organization_value, role_code_system, role_code
             FROM read_access_tags WHERE resource_id = ?1
             ORDER BY access_type, organization_system, organization_value, role_code_system, role_code",
        )?;
        let rows = stmt
            .query_map(params![resource_id], |row| {
                Ok(DeclaredTagRow {
                    access_type: row.get(0)?,
                    organization_system: row.get(1)?,
                    organization_value: row.get(2)?,
                    role_code_system: row.get(3)?,
                    role_code: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tags = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_tag() {
                Ok(tag) => tags.push(tag),
                Err(e) => {
                    tracing::warn!(resource_id, error = %e, "Skipping unresolvable read access tag");
                }
            }
        }
        Ok(tags)
    }

    /// Computes the rows current tags and organization state grant.
    pub fn desired_rows(&self, resource_id: &str) -> StorageResult<BTreeSet<AccessIndexRow>> {
        let mut rows = BTreeSet::new();
        for tag in self.declared_tags(resource_id)? {
            let resolved = self.resolve_tag(resource_id, &tag)?;
            if resolved.is_empty() {
                tracing::debug!(resource_id, tag = %tag, "Read access tag not resolvable yet");
            }
            for row in resolved {
                if let Some(duplicate) = rows.replace(row) {
                    tracing::debug!(
                        resource_id,
                        row = %duplicate,
                        "Collapsed read access row granted by several tags"
                    );
                }
            }
        }
        Ok(rows)
    }

    /// Returns the rows currently stored for a resource.
    pub fn existing_rows(&self, resource_id: &str) -> StorageResult<BTreeSet<AccessIndexRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT access_type, organization_id, organization_affiliation_id
             FROM read_access WHERE resource_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![resource_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(access_type, organization_id, organization_affiliation_id)| {
                Ok(AccessIndexRow {
                    resource_id: resource_id.to_string(),
                    access_type: parse_stored_kind(resource_id, &access_type)?,
                    organization_id,
                    organization_affiliation_id,
                })
            })
            .collect()
    }

    /// Compares the stored index with the rows current state grants.
    pub fn audit(&self) -> StorageResult<IndexAudit> {
        let mut audit = IndexAudit::default();

        let mut stmt = self
            .conn
            .prepare("SELECT id FROM resources WHERE is_deleted = 0 ORDER BY id")?;
        let resource_ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        for resource_id in &resource_ids {
            let desired = self.desired_rows(resource_id)?;
            let existing = self.existing_rows(resource_id)?;

            for row in desired.difference(&existing) {
                audit.findings.push(IndexFinding::Missing(row.clone()));
            }
            for row in existing.difference(&desired) {
                if self.references_dead_grantor(row)? {
                    audit.findings.push(IndexFinding::Orphan(row.clone()));
                } else {
                    audit.findings.push(IndexFinding::Unexpected(row.clone()));
                }
            }
            audit.resources_checked += 1;
        }

        let mut stmt = self.conn.prepare(
            "SELECT ra.resource_id, ra.access_type, ra.organization_id, ra.organization_affiliation_id
             FROM read_access ra
             LEFT JOIN resources r ON r.id = ra.resource_id
             WHERE r.id IS NULL OR r.is_deleted = 1
             ORDER BY ra.resource_id",
        )?;
        let dead = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (resource_id, access_type, organization_id, organization_affiliation_id) in dead {
            let access_type = parse_stored_kind(&resource_id, &access_type)?;
            audit.findings.push(IndexFinding::Orphan(AccessIndexRow {
                resource_id,
                access_type,
                organization_id,
                organization_affiliation_id,
            }));
        }

        audit.rows_checked = self
            .conn
            .query_row("SELECT COUNT(*) FROM read_access", [], |row| row.get::<_, i64>(0))?
            as u64;
        audit
            .findings
            .sort_by(|a, b| a.row().resource_id.cmp(&b.row().resource_id));

        for finding in &audit.findings {
            tracing::error!(
                resource_id = %finding.row().resource_id,
                error = %finding.to_error(),
                "Read access index inconsistency"
            );
        }
        Ok(audit)
    }

    fn replace_declared_tags(&self, resource_id: &str, tags: &[AccessTag]) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM read_access_tags WHERE resource_id = ?1",
            params![resource_id],
        )?;

        let unique: BTreeSet<&AccessTag> = tags.iter().collect();
        let mut insert = self.conn.prepare(
            "INSERT INTO read_access_tags
                (resource_id, access_type, organization_system, organization_value, role_code_system, role_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for tag in unique {
            let (organization, role): (Option<&Identifier>, Option<(&str, &str)>) = match tag {
                AccessTag::All | AccessTag::Local => (None, None),
                AccessTag::Organization(identifier) => (Some(identifier), None),
                AccessTag::Role(role) => (
                    Some(&role.parent_organization),
                    Some((role.code_system.as_str(), role.code.as_str())),
                ),
            };
            insert.execute(params![
                resource_id,
                tag.kind().as_str(),
                organization.map(|i| i.system.as_str()),
                organization.map(|i| i.value.as_str()),
                role.map(|(system, _)| system),
                role.map(|(_, code)| code),
            ])?;
        }
        Ok(())
    }

    fn resolve_tag(&self, resource_id: &str, tag: &AccessTag) -> StorageResult<Vec<AccessIndexRow>> {
        match tag {
            AccessTag::All | AccessTag::Local => {
                Ok(vec![AccessIndexRow::unbound(resource_id, tag.kind())])
            }
            AccessTag::Organization(identifier) => {
                let mut stmt = self.conn.prepare(
                    "SELECT organization_id FROM organizations
                     WHERE identifier_system = ?1 AND identifier_value = ?2 AND active = 1
                     ORDER BY organization_id",
                )?;
                let rows = stmt
                    .query_map(params![identifier.system, identifier.value], |row| {
                        Ok(AccessIndexRow::organization(resource_id, row.get::<_, String>(0)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
            AccessTag::Role(RoleDescriptor {
                parent_organization,
                code_system,
                code,
            }) => {
                let mut stmt = self.conn.prepare(ROLE_GRANTS_SQL)?;
                let rows = stmt
                    .query_map(
                        params![
                            parent_organization.system,
                            parent_organization.value,
                            code_system,
                            code
                        ],
                        |row| {
                            Ok(AccessIndexRow::role(
                                resource_id,
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                            ))
                        },
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        }
    }

    fn insert_row(&self, row: &AccessIndexRow) -> StorageResult<()> {
        let result = self.conn.execute(
            "INSERT INTO read_access (resource_id, access_type, organization_id, organization_affiliation_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                row.resource_id,
                row.access_type.as_str(),
                row.organization_id,
                row.organization_affiliation_id
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, message))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                let err = AccessError::IndexInconsistency {
                    resource_id: row.resource_id.clone(),
                    message: format!(
                        "cannot insert row {}: {}",
                        row,
                        message.unwrap_or_else(|| e.to_string())
                    ),
                };
                tracing::error!(resource_id = %row.resource_id, error = %err, "Read access index constraint violated");
                Err(err.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete_row(&self, row: &AccessIndexRow) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM read_access
             WHERE resource_id = ?1 AND access_type = ?2
               AND organization_id IS ?3 AND organization_affiliation_id IS ?4",
            params![
                row.resource_id,
                row.access_type.as_str(),
                row.organization_id,
                row.organization_affiliation_id
            ],
        )?;
        Ok(())
    }

    /// Returns `true` if a row names an organization or affiliation that is
    /// missing or inactive.
    fn references_dead_grantor(&self, row: &AccessIndexRow) -> StorageResult<bool> {
        if let Some(organization_id) = &row.organization_id {
            let active: Option<bool> = self
                .conn
                .query_row(
                    "SELECT active FROM organizations WHERE organization_id = ?1",
                    params![organization_id],
                    |r| r.get(0),
                )
                .optional()?;
            if active != Some(true) {
                return Ok(true);
            }
        }
        if let Some(affiliation_id) = &row.organization_affiliation_id {
            let active: Option<bool> = self
                .conn
                .query_row(
                    "SELECT active FROM organization_affiliations WHERE affiliation_id = ?1",
                    params![affiliation_id],
                    |r| r.get(0),
                )
                .optional()?;
            if active != Some(true) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn collect_ids(
        &self,
        into: &mut BTreeSet<String>,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StorageResult<()> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt.query_map(params, |row| row.get::<_, String>(0))?;
        for id in ids {
            into.insert(id?);
        }
        Ok(())
    }
}

/// One row of `read_access_tags`.
struct DeclaredTagRow {
    access_type: String,
    organization_system: Option<String>,
    organization_value: Option<String>,
    role_code_system: Option<String>,
    role_code: Option<String>,
}

impl DeclaredTagRow {
    fn into_tag(self) -> AccessResult<AccessTag> {
        let kind: AccessKind = self.access_type.parse()?;
        let organization = self
            .organization_system
            .zip(self.organization_value)
            .map(|(system, value)| Identifier::new(system, value));

        match kind {
            AccessKind::All => Ok(AccessTag::All),
            AccessKind::Local => Ok(AccessTag::Local),
            AccessKind::Organization => organization
                .map(AccessTag::Organization)
                .ok_or_else(|| AccessError::invalid_tag("ORGANIZATION tag without identifier")),
            AccessKind::Role => {
                let parent = organization.ok_or_else(|| {
                    AccessError::invalid_tag("ROLE tag without parent organization")
                })?;
                let (code_system, code) = self
                    .role_code_system
                    .zip(self.role_code)
                    .ok_or_else(|| AccessError::invalid_tag("ROLE tag without role code"))?;
                Ok(AccessTag::Role(RoleDescriptor::new(parent, code_system, code)))
            }
        }
    }
}

fn parse_stored_kind(resource_id: &str, access_type: &str) -> StorageResult<AccessKind> {
    access_type.parse().map_err(|_| {
        StorageError::from(AccessError::IndexInconsistency {
            resource_id: resource_id.to_string(),
            message: format!("unknown access type '{}' in index", access_type),
        })
    })
}
