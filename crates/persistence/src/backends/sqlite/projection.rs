//! Projections of `Organization` and `OrganizationAffiliation` resources.
//!
//! The `organizations`, `organization_affiliations` and
//! `organization_affiliation_roles` tables hold the access-relevant state of
//! live resources of those types. They are written in the same transaction as
//! the resource itself and read by the resolver and identity resolution.

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, params};

use crate::access::{AffiliationState, Identifier, OrganizationState, RoleCode};
use crate::error::StorageResult;

/// Loads the stored state of an organization.
pub(crate) fn load_organization(
    conn: &Connection,
    organization_id: &str,
) -> StorageResult<Option<OrganizationState>> {
    let row = conn
        .query_row(
            "SELECT identifier_system, identifier_value, active
             FROM organizations WHERE organization_id = ?1",
            params![organization_id],
            |row| {
                let system: Option<String> = row.get(0)?;
                let value: Option<String> = row.get(1)?;
                let active: bool = row.get(2)?;
                Ok((system, value, active))
            },
        )
        .optional()?;

    Ok(row.map(|(system, value, active)| OrganizationState {
        identifier: system.zip(value).map(|(s, v)| Identifier::new(s, v)),
        active,
    }))
}

/// Writes or removes the stored state of an organization.
pub(crate) fn store_organization(
    conn: &Connection,
    organization_id: &str,
    state: Option<&OrganizationState>,
) -> StorageResult<()> {
    match state {
        Some(state) => {
            let (system, value) = match &state.identifier {
                Some(identifier) => (Some(&identifier.system), Some(&identifier.value)),
                None => (None, None),
            };
            conn.execute(
                "INSERT INTO organizations (organization_id, identifier_system, identifier_value, active)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(organization_id) DO UPDATE SET
                    identifier_system = excluded.identifier_system,
                    identifier_value = excluded.identifier_value,
                    active = excluded.active",
                params![organization_id, system, value, state.active],
            )?;
        }
        None => {
            conn.execute(
                "DELETE FROM organizations WHERE organization_id = ?1",
                params![organization_id],
            )?;
        }
    }
    Ok(())
}

/// Loads the stored state of an affiliation.
pub(crate) fn load_affiliation(
    conn: &Connection,
    affiliation_id: &str,
) -> StorageResult<Option<AffiliationState>> {
    let row = conn
        .query_row(
            "SELECT parent_organization_id, participating_organization_id, active
             FROM organization_affiliations WHERE affiliation_id = ?1",
            params![affiliation_id],
            |row| {
                let parent: Option<String> = row.get(0)?;
                let participating: Option<String> = row.get(1)?;
                let active: bool = row.get(2)?;
                Ok((parent, participating, active))
            },
        )
        .optional()?;

    let Some((parent_organization_id, participating_organization_id, active)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT code_system, code FROM organization_affiliation_roles WHERE affiliation_id = ?1",
    )?;
    let roles = stmt
        .query_map(params![affiliation_id], |row| {
            Ok(RoleCode::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(Some(AffiliationState {
        parent_organization_id,
        participating_organization_id,
        roles,
        active,
    }))
}

/// Writes or removes the stored state of an affiliation, including its roles.
pub(crate) fn store_affiliation(
    conn: &Connection,
    affiliation_id: &str,
    state: Option<&AffiliationState>,
) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM organization_affiliation_roles WHERE affiliation_id = ?1",
        params![affiliation_id],
    )?;

    let Some(state) = state else {
        conn.execute(
            "DELETE FROM organization_affiliations WHERE affiliation_id = ?1",
            params![affiliation_id],
        )?;
        return Ok(());
    };

    conn.execute(
        "INSERT INTO organization_affiliations
            (affiliation_id, parent_organization_id, participating_organization_id, active)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(affiliation_id) DO UPDATE SET
            parent_organization_id = excluded.parent_organization_id,
            participating_organization_id = excluded.participating_organization_id,
            active = excluded.active",
        params![
            affiliation_id,
            state.parent_organization_id,
            state.participating_organization_id,
            state.active
        ],
    )?;

    let mut insert = conn.prepare(
        "INSERT INTO organization_affiliation_roles (affiliation_id, code_system, code)
         VALUES (?1, ?2, ?3)",
    )?;
    for role in &state.roles {
        insert.execute(params![affiliation_id, role.system, role.code])?;
    }

    Ok(())
}
