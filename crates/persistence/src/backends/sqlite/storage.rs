//! ResourceStorage implementation for SQLite.
//!
//! Every write runs in one `IMMEDIATE` transaction that covers the resource
//! row, the organization and affiliation projections and the read access
//! index. A failure anywhere rolls all of it back.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;

use crate::access::organization::{ORGANIZATION, ORGANIZATION_AFFILIATION};
use crate::access::{AccessTag, AffiliationState, OrganizationState, helper};
use crate::core::ResourceStorage;
use crate::error::{
    BackendError, ConcurrencyError, ResourceError, StorageError, StorageResult, ValidationError,
};
use crate::types::StoredResource;

use super::SqliteBackend;
use super::access_index::AccessResolver;
use super::projection;

fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

fn serialization_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::SerializationError { message })
}

/// Formats a timestamp with fixed precision so stored values sort as text.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| internal_error(format!("Failed to parse timestamp '{}': {}", value, e)))
}

/// Columns selected for a live resource, in order.
pub(crate) const RESOURCE_COLUMNS: &str =
    "r.id, r.resource_type, r.version_id, r.data, r.created_at, r.last_updated";

/// A live resource row as selected with [`RESOURCE_COLUMNS`].
pub(crate) struct LiveRow {
    id: String,
    resource_type: String,
    version_id: String,
    data: Vec<u8>,
    created_at: String,
    last_updated: String,
}

impl LiveRow {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            resource_type: row.get(1)?,
            version_id: row.get(2)?,
            data: row.get(3)?,
            created_at: row.get(4)?,
            last_updated: row.get(5)?,
        })
    }

    pub(crate) fn into_stored(self) -> StorageResult<StoredResource> {
        let content: Value = serde_json::from_slice(&self.data)
            .map_err(|e| serialization_error(format!("Failed to deserialize resource: {}", e)))?;
        Ok(StoredResource::from_storage(
            self.resource_type,
            self.id,
            self.version_id,
            content,
            parse_timestamp(&self.created_at)?,
            parse_timestamp(&self.last_updated)?,
        ))
    }
}

/// The current row of a logical id, live or deleted.
struct CurrentRow {
    resource_type: String,
    version_id: String,
    data: Vec<u8>,
    created_at: String,
    last_updated: String,
    is_deleted: bool,
    deleted_at: Option<String>,
}

fn load_current(conn: &Connection, id: &str) -> StorageResult<Option<CurrentRow>> {
    conn.query_row(
        "SELECT resource_type, version_id, data, created_at, last_updated, is_deleted, deleted_at
         FROM resources WHERE id = ?1",
        params![id],
        |row| {
            Ok(CurrentRow {
                resource_type: row.get(0)?,
                version_id: row.get(1)?,
                data: row.get(2)?,
                created_at: row.get(3)?,
                last_updated: row.get(4)?,
                is_deleted: row.get(5)?,
                deleted_at: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(|e| internal_error(format!("Failed to read resource: {}", e)))
}

fn next_version(current: &str) -> String {
    let version: u64 = current.parse().unwrap_or(0);
    (version + 1).to_string()
}

/// Access-relevant content of a resource about to be written.
struct PreparedWrite {
    tags: Vec<AccessTag>,
    organization: Option<OrganizationState>,
    affiliation: Option<AffiliationState>,
}

/// Sets `resourceType` and `id` and validates the read access content.
fn prepare_write(
    resource_type: &str,
    id: &str,
    resource: Value,
) -> StorageResult<(Value, PreparedWrite)> {
    let mut resource = resource;
    let Some(object) = resource.as_object_mut() else {
        return Err(ValidationError::InvalidResource {
            message: "resource must be a JSON object".to_string(),
        }
        .into());
    };

    if let Some(declared) = object.get("resourceType").and_then(Value::as_str) {
        if declared != resource_type {
            return Err(ValidationError::InvalidResource {
                message: format!(
                    "resourceType '{}' does not match '{}'",
                    declared, resource_type
                ),
            }
            .into());
        }
    }
    object.insert(
        "resourceType".to_string(),
        Value::String(resource_type.to_string()),
    );
    object.insert("id".to_string(), Value::String(id.to_string()));

    let tags = helper::access_tags(&resource)?;
    let organization =
        (resource_type == ORGANIZATION).then(|| OrganizationState::from_resource(&resource));
    let affiliation = if resource_type == ORGANIZATION_AFFILIATION {
        Some(AffiliationState::from_resource(&resource)?)
    } else {
        None
    };

    Ok((
        resource,
        PreparedWrite {
            tags,
            organization,
            affiliation,
        },
    ))
}

/// Updates projections and the read access index for a write (`Some`) or a
/// delete (`None`) of a resource.
fn sync_access(
    conn: &Connection,
    resource_type: &str,
    id: &str,
    write: Option<&PreparedWrite>,
) -> StorageResult<()> {
    let resolver = AccessResolver::new(conn);

    if resource_type == ORGANIZATION {
        let old = projection::load_organization(conn, id)?;
        let new = write.and_then(|w| w.organization.as_ref());
        projection::store_organization(conn, id, new)?;
        resolver.on_organization_change(id, old.as_ref(), new)?;
    } else if resource_type == ORGANIZATION_AFFILIATION {
        let old = projection::load_affiliation(conn, id)?;
        let new = write.and_then(|w| w.affiliation.as_ref());
        projection::store_affiliation(conn, id, new)?;
        resolver.on_affiliation_change(id, old.as_ref(), new)?;
    }

    match write {
        Some(write) => {
            resolver.on_resource_write(id, &write.tags)?;
        }
        None => {
            resolver.on_resource_delete(id)?;
        }
    }
    Ok(())
}

fn insert_new(
    conn: &Connection,
    resource_type: &str,
    id: &str,
    resource: Value,
    write: &PreparedWrite,
) -> StorageResult<StoredResource> {
    let data = serde_json::to_vec(&resource)
        .map_err(|e| serialization_error(format!("Failed to serialize resource: {}", e)))?;
    let now = Utc::now();
    let timestamp = format_timestamp(now);

    conn.execute(
        "INSERT INTO resources (id, resource_type, version_id, data, created_at, last_updated, is_deleted)
         VALUES (?1, ?2, '1', ?3, ?4, ?4, 0)",
        params![id, resource_type, data, timestamp],
    )
    .map_err(|e| internal_error(format!("Failed to insert resource: {}", e)))?;

    sync_access(conn, resource_type, id, Some(write))?;

    Ok(StoredResource::from_storage(
        resource_type,
        id,
        "1",
        resource,
        now,
        now,
    ))
}

fn write_new_version(
    conn: &Connection,
    resource_type: &str,
    id: &str,
    current: &CurrentRow,
    resource: Value,
    write: &PreparedWrite,
) -> StorageResult<StoredResource> {
    let data = serde_json::to_vec(&resource)
        .map_err(|e| serialization_error(format!("Failed to serialize resource: {}", e)))?;
    let version_id = next_version(&current.version_id);
    let now = Utc::now();

    conn.execute(
        "UPDATE resources
         SET version_id = ?1, data = ?2, last_updated = ?3, is_deleted = 0, deleted_at = NULL
         WHERE id = ?4",
        params![version_id, data, format_timestamp(now), id],
    )
    .map_err(|e| internal_error(format!("Failed to update resource: {}", e)))?;

    sync_access(conn, resource_type, id, Some(write))?;

    Ok(StoredResource::from_storage(
        resource_type,
        id,
        version_id,
        resource,
        parse_timestamp(&current.created_at)?,
        now,
    ))
}

#[async_trait]
impl ResourceStorage for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn create(&self, resource_type: &str, resource: Value) -> StorageResult<StoredResource> {
        let id = resource
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (resource, write) = prepare_write(resource_type, &id, resource)?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if load_current(&tx, &id)?.is_some() {
            return Err(StorageError::Resource(ResourceError::AlreadyExists {
                resource_type: resource_type.to_string(),
                id,
            }));
        }

        let stored = insert_new(&tx, resource_type, &id, resource, &write)?;
        tx.commit()?;

        tracing::debug!(resource_type, id = %id, tags = write.tags.len(), "Created resource");
        Ok(stored)
    }

    async fn create_or_update(
        &self,
        resource_type: &str,
        id: &str,
        resource: Value,
    ) -> StorageResult<(StoredResource, bool)> {
        let (resource, write) = prepare_write(resource_type, id, resource)?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result = match load_current(&tx, id)? {
            None => (insert_new(&tx, resource_type, id, resource, &write)?, true),
            Some(current) if current.resource_type != resource_type => {
                return Err(StorageError::Resource(ResourceError::AlreadyExists {
                    resource_type: current.resource_type,
                    id: id.to_string(),
                }));
            }
            Some(current) => {
                let stored = write_new_version(&tx, resource_type, id, &current, resource, &write)?;
                (stored, current.is_deleted)
            }
        };
        tx.commit()?;

        tracing::debug!(
            resource_type,
            id,
            version = result.0.version_id(),
            created = result.1,
            "Stored resource"
        );
        Ok(result)
    }

    async fn read(&self, resource_type: &str, id: &str) -> StorageResult<Option<StoredResource>> {
        let conn = self.get_connection()?;

        let Some(current) = load_current(&conn, id)? else {
            return Ok(None);
        };
        if current.resource_type != resource_type {
            return Ok(None);
        }

        if current.is_deleted {
            let deleted_at = current
                .deleted_at
                .as_deref()
                .and_then(|s| parse_timestamp(s).ok());
            return Err(StorageError::Resource(ResourceError::Gone {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                deleted_at,
            }));
        }

        let content: Value = serde_json::from_slice(&current.data)
            .map_err(|e| serialization_error(format!("Failed to deserialize resource: {}", e)))?;

        Ok(Some(StoredResource::from_storage(
            resource_type,
            id,
            current.version_id,
            content,
            parse_timestamp(&current.created_at)?,
            parse_timestamp(&current.last_updated)?,
        )))
    }

    async fn update(
        &self,
        current: &StoredResource,
        resource: Value,
    ) -> StorageResult<StoredResource> {
        let resource_type = current.resource_type();
        let id = current.id();
        let (resource, write) = prepare_write(resource_type, id, resource)?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored_row = match load_current(&tx, id)? {
            Some(row) if !row.is_deleted && row.resource_type == resource_type => row,
            _ => {
                return Err(StorageError::Resource(ResourceError::NotFound {
                    resource_type: resource_type.to_string(),
                    id: id.to_string(),
                }));
            }
        };

        if stored_row.version_id != current.version_id() {
            return Err(StorageError::Concurrency(
                ConcurrencyError::VersionConflict {
                    resource_type: resource_type.to_string(),
                    id: id.to_string(),
                    expected_version: current.version_id().to_string(),
                    actual_version: stored_row.version_id,
                },
            ));
        }

        let stored = write_new_version(&tx, resource_type, id, &stored_row, resource, &write)?;
        tx.commit()?;

        tracing::debug!(resource_type, id, version = stored.version_id(), "Updated resource");
        Ok(stored)
    }

    async fn delete(&self, resource_type: &str, id: &str) -> StorageResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = match load_current(&tx, id)? {
            Some(row) if !row.is_deleted && row.resource_type == resource_type => row,
            _ => {
                return Err(StorageError::Resource(ResourceError::NotFound {
                    resource_type: resource_type.to_string(),
                    id: id.to_string(),
                }));
            }
        };

        let version_id = next_version(&current.version_id);
        let deleted_at = format_timestamp(Utc::now());

        tx.execute(
            "UPDATE resources SET is_deleted = 1, deleted_at = ?1, version_id = ?2, last_updated = ?1
             WHERE id = ?3",
            params![deleted_at, version_id, id],
        )
        .map_err(|e| internal_error(format!("Failed to delete resource: {}", e)))?;

        sync_access(&tx, resource_type, id, None)?;
        tx.commit()?;

        tracing::debug!(
            resource_type,
            id,
            previous_update = %current.last_updated,
            "Deleted resource"
        );
        Ok(())
    }

    async fn count(&self, resource_type: Option<&str>) -> StorageResult<u64> {
        let conn = self.get_connection()?;

        let count: i64 = if let Some(rt) = resource_type {
            conn.query_row(
                "SELECT COUNT(*) FROM resources WHERE resource_type = ?1 AND is_deleted = 0",
                params![rt],
                |row| row.get(0),
            )
        } else {
            conn.query_row(
                "SELECT COUNT(*) FROM resources WHERE is_deleted = 0",
                [],
                |row| row.get(0),
            )
        }
        .map_err(|e| internal_error(format!("Failed to count resources: {}", e)))?;

        Ok(count as u64)
    }
}
