//! SQLite schema definitions and migrations.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

fn schema_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::MigrationError { message })
}

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        tracing::info!(version = SCHEMA_VERSION, "Created SQLite schema");
    } else if current_version > SCHEMA_VERSION {
        return Err(schema_error(format!(
            "database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    } else {
        tracing::debug!(version = current_version, "SQLite schema is up to date");
    }

    Ok(())
}

/// Get the current schema version, 0 for a fresh database.
pub fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| schema_error(format!("Failed to create schema_version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| schema_error(format!("Failed to clear schema_version: {}", e)))?;

    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| schema_error(format!("Failed to set schema_version: {}", e)))?;

    Ok(())
}

/// Create the initial schema (version 1).
///
/// Logical ids are unique across resource types. Index and projection rows
/// reference `resources` with deferred foreign keys, so a write transaction
/// may remove a projection before the rows depending on it and is only
/// checked at commit.
fn create_schema_v1(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS resources (
            id TEXT PRIMARY KEY,
            resource_type TEXT NOT NULL,
            version_id TEXT NOT NULL,
            data BLOB NOT NULL,
            created_at TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_resources_type
            ON resources(resource_type, is_deleted, last_updated);

        -- Access-relevant projection of live Organization resources
        CREATE TABLE IF NOT EXISTS organizations (
            organization_id TEXT PRIMARY KEY
                REFERENCES resources(id) DEFERRABLE INITIALLY DEFERRED,
            identifier_system TEXT,
            identifier_value TEXT,
            active INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_organizations_identifier
            ON organizations(identifier_system, identifier_value);

        -- Access-relevant projection of live OrganizationAffiliation resources
        CREATE TABLE IF NOT EXISTS organization_affiliations (
            affiliation_id TEXT PRIMARY KEY
                REFERENCES resources(id) DEFERRABLE INITIALLY DEFERRED,
            parent_organization_id TEXT,
            participating_organization_id TEXT,
            active INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_affiliations_parent
            ON organization_affiliations(parent_organization_id);
        CREATE INDEX IF NOT EXISTS idx_affiliations_participating
            ON organization_affiliations(participating_organization_id);

        CREATE TABLE IF NOT EXISTS organization_affiliation_roles (
            affiliation_id TEXT NOT NULL
                REFERENCES organization_affiliations(affiliation_id) DEFERRABLE INITIALLY DEFERRED,
            code_system TEXT NOT NULL,
            code TEXT NOT NULL,
            PRIMARY KEY (affiliation_id, code_system, code)
        );

        CREATE INDEX IF NOT EXISTS idx_affiliation_roles_code
            ON organization_affiliation_roles(code_system, code);

        -- Declared read access tags of live resources
        CREATE TABLE IF NOT EXISTS read_access_tags (
            resource_id TEXT NOT NULL
                REFERENCES resources(id) DEFERRABLE INITIALLY DEFERRED,
            access_type TEXT NOT NULL
                CHECK (access_type IN ('ALL', 'LOCAL', 'ORGANIZATION', 'ROLE')),
            organization_system TEXT,
            organization_value TEXT,
            role_code_system TEXT,
            role_code TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS ux_read_access_tags ON read_access_tags(
            resource_id,
            access_type,
            COALESCE(organization_system, ''),
            COALESCE(organization_value, ''),
            COALESCE(role_code_system, ''),
            COALESCE(role_code, '')
        );
        CREATE INDEX IF NOT EXISTS idx_read_access_tags_organization
            ON read_access_tags(organization_system, organization_value);

        -- Resolved grants
        CREATE TABLE IF NOT EXISTS read_access (
            resource_id TEXT NOT NULL
                REFERENCES resources(id) DEFERRABLE INITIALLY DEFERRED,
            access_type TEXT NOT NULL
                CHECK (access_type IN ('ALL', 'LOCAL', 'ORGANIZATION', 'ROLE')),
            organization_id TEXT
                REFERENCES organizations(organization_id) DEFERRABLE INITIALLY DEFERRED,
            organization_affiliation_id TEXT
                REFERENCES organization_affiliations(affiliation_id) DEFERRABLE INITIALLY DEFERRED,
            CHECK (
                (access_type IN ('ALL', 'LOCAL')
                    AND organization_id IS NULL AND organization_affiliation_id IS NULL)
                OR (access_type = 'ORGANIZATION'
                    AND organization_id IS NOT NULL AND organization_affiliation_id IS NULL)
                OR (access_type = 'ROLE'
                    AND organization_id IS NOT NULL AND organization_affiliation_id IS NOT NULL)
            )
        );

        CREATE UNIQUE INDEX IF NOT EXISTS ux_read_access ON read_access(
            resource_id,
            access_type,
            COALESCE(organization_id, ''),
            COALESCE(organization_affiliation_id, '')
        );
        CREATE INDEX IF NOT EXISTS idx_read_access_organization
            ON read_access(organization_id);
        CREATE INDEX IF NOT EXISTS idx_read_access_affiliation
            ON read_access(organization_affiliation_id);
        ",
    )
    .map_err(|e| schema_error(format!("Failed to create schema: {}", e)))?;

    Ok(())
}
