//! Access-controlled search and index inspection for SQLite.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, ToSql, params};

use crate::access::{AccessIndexRow, AccessKind, AccessTag, Identifier, IndexAudit, RoleCode};
use crate::core::{AccessControlledSearch, AccessIndexProvider};
use crate::error::{AccessError, StorageResult};
use crate::identity::{BoundOrganization, Identity, LocalRole, OrganizationRole};
use crate::types::{Page, SearchQuery, StoredResource};

use super::SqliteBackend;
use super::access_index::AccessResolver;
use super::search::{AccessFilterCompiler, QueryBuilder, RESOURCE_ALIAS, SqlParam};
use super::storage::{LiveRow, RESOURCE_COLUMNS};

/// Roles held by an organization through active affiliations whose parent is
/// active and identified.
const ORGANIZATION_ROLES_SQL: &str = "
    SELECT a.affiliation_id, p.identifier_system, p.identifier_value, r.code_system, r.code
    FROM organization_affiliations a
    JOIN organization_affiliation_roles r ON r.affiliation_id = a.affiliation_id
    JOIN organizations p ON p.organization_id = a.parent_organization_id
    WHERE a.participating_organization_id = ?1
      AND a.active = 1
      AND p.active = 1
      AND p.identifier_system IS NOT NULL
      AND p.identifier_value IS NOT NULL
    ORDER BY a.affiliation_id, r.code_system, r.code";

fn organization_roles(
    conn: &Connection,
    organization_id: &str,
) -> StorageResult<Vec<OrganizationRole>> {
    let mut stmt = conn.prepare(ORGANIZATION_ROLES_SQL)?;
    let roles = stmt
        .query_map(params![organization_id], |row| {
            Ok(OrganizationRole::new(
                row.get::<_, String>(0)?,
                Identifier::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
                RoleCode::new(row.get::<_, String>(3)?, row.get::<_, String>(4)?),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(roles)
}

#[async_trait]
impl AccessControlledSearch for SqliteBackend {
    async fn search(
        &self,
        identity: &Identity,
        query: &SearchQuery,
    ) -> StorageResult<Page<StoredResource>> {
        let builder = QueryBuilder::new(identity);
        let order_by = builder.build_order_by(query)?;
        let filter = builder.build_where(query);
        let count = self.page_size(query.count);
        let offset = query.offset.unwrap_or(0);

        let mut conn = self.get_connection()?;
        // One read transaction so the total and the page see the same snapshot
        let tx = conn.transaction()?;

        let total: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM resources {} WHERE {}", RESOURCE_ALIAS, filter.sql),
            filter.param_refs().as_slice(),
            |row| row.get(0),
        )?;

        let rows = {
            let sql = format!(
                "SELECT {} FROM resources {} WHERE {} {} {}",
                RESOURCE_COLUMNS,
                RESOURCE_ALIAS,
                filter.sql,
                order_by,
                QueryBuilder::build_limit(count, offset)
            );
            let mut stmt = tx.prepare(&sql)?;
            stmt.query_map(filter.param_refs().as_slice(), LiveRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        tx.finish()?;

        let items = rows
            .into_iter()
            .map(LiveRow::into_stored)
            .collect::<StorageResult<Vec<_>>>()?;

        tracing::debug!(
            resource_type = %query.resource_type,
            identity = ?identity.kind(),
            correlation_id = identity.correlation_id(),
            total,
            returned = items.len(),
            "Executed access-controlled search"
        );

        Ok(Page::new(items, total as u64, offset, count))
    }

    async fn read_as(
        &self,
        identity: &Identity,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<StoredResource> {
        let filter = AccessFilterCompiler::new(RESOURCE_ALIAS)
            .with_param_offset(2)
            .compile(identity);
        let sql = format!(
            "SELECT {columns} FROM resources {alias}
             WHERE {alias}.resource_type = ?1 AND {alias}.id = ?2 AND {alias}.is_deleted = 0
               AND ({filter})",
            columns = RESOURCE_COLUMNS,
            alias = RESOURCE_ALIAS,
            filter = filter.sql
        );

        let mut bound: Vec<&dyn ToSql> = vec![&resource_type, &id];
        bound.extend(filter.param_refs());

        let conn = self.get_connection()?;
        let row = conn
            .query_row(&sql, bound.as_slice(), LiveRow::from_row)
            .optional()?;

        match row {
            Some(row) => row.into_stored(),
            None => {
                tracing::debug!(
                    resource_type,
                    id,
                    identity = ?identity.kind(),
                    correlation_id = identity.correlation_id(),
                    "Read denied or resource not found"
                );
                Err(AccessError::AuthorizationDenied {
                    resource_type: resource_type.to_string(),
                    id: id.to_string(),
                }
                .into())
            }
        }
    }

    async fn resolve_identity(
        &self,
        organization: &Identifier,
        local: Option<LocalRole>,
    ) -> StorageResult<Option<Identity>> {
        let conn = self.get_connection()?;

        let stored: Option<(String, bool)> = conn
            .query_row(
                "SELECT organization_id, active FROM organizations
                 WHERE identifier_system = ?1 AND identifier_value = ?2
                 ORDER BY active DESC, organization_id
                 LIMIT 1",
                params![organization.system, organization.value],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let bound = stored.as_ref().map(|(id, active)| {
            BoundOrganization::new(id.clone(), organization.clone(), *active)
        });

        let identity = match (local, bound) {
            (Some(role), Some(bound)) => Some(Identity::local(role).with_organization(bound)),
            (Some(role), None) => Some(Identity::local(role)),
            (None, Some(bound)) => {
                let roles = if bound.active {
                    organization_roles(&conn, &bound.id)?
                } else {
                    Vec::new()
                };
                Some(Identity::remote(bound).with_roles(roles))
            }
            (None, None) => {
                tracing::debug!(organization = %organization, "No stored organization for caller");
                None
            }
        };

        Ok(identity)
    }
}

#[async_trait]
impl AccessIndexProvider for SqliteBackend {
    async fn read_access_rows(&self, resource_id: &str) -> StorageResult<Vec<AccessIndexRow>> {
        let conn = self.get_connection()?;
        let rows = AccessResolver::new(&conn).existing_rows(resource_id)?;
        Ok(rows.into_iter().collect())
    }

    async fn declared_access_tags(&self, resource_id: &str) -> StorageResult<Vec<AccessTag>> {
        let conn = self.get_connection()?;
        AccessResolver::new(&conn).declared_tags(resource_id)
    }

    async fn count_read_access(
        &self,
        resource_id: Option<&str>,
        access_type: Option<AccessKind>,
    ) -> StorageResult<u64> {
        let mut conditions = vec!["1 = 1".to_string()];
        let mut values = Vec::new();
        if let Some(resource_id) = resource_id {
            values.push(SqlParam::string(resource_id));
            conditions.push(format!("resource_id = ?{}", values.len()));
        }
        if let Some(kind) = access_type {
            values.push(SqlParam::string(kind.as_str()));
            conditions.push(format!("access_type = ?{}", values.len()));
        }

        let sql = format!(
            "SELECT COUNT(*) FROM read_access WHERE {}",
            conditions.join(" AND ")
        );
        let bound: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();

        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(&sql, bound.as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn verify_access_index(&self) -> StorageResult<IndexAudit> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let audit = AccessResolver::new(&tx).audit()?;
        tx.finish()?;

        if audit.is_consistent() {
            tracing::info!(
                resources = audit.resources_checked,
                rows = audit.rows_checked,
                "Read access index is consistent"
            );
        } else {
            tracing::warn!(
                resources = audit.resources_checked,
                rows = audit.rows_checked,
                findings = audit.findings.len(),
                "Read access index has inconsistencies"
            );
        }
        Ok(audit)
    }
}
