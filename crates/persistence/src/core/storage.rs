//! Core resource storage trait.
//!
//! This module defines the [`ResourceStorage`] trait with the CRUD operations
//! for FHIR resources. Implementations maintain the read access index inside
//! the same transaction as every write.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;
use crate::types::StoredResource;

/// Core storage trait for FHIR resources.
///
/// # Versioning
///
/// Every create, update and delete produces a new version id. `update` checks
/// the version of the passed `current` resource and fails with a version
/// conflict if the stored resource moved on.
///
/// # Read access
///
/// Writes validate the read access tags of the resource and fail with
/// `InvalidTag` for malformed ones. Writes to `Organization` and
/// `OrganizationAffiliation` resources recompute every index row that depends
/// on them before the transaction commits.
///
/// `read` is unrestricted. Use
/// [`AccessControlledSearch::read_as`](super::AccessControlledSearch::read_as)
/// on behalf of a caller.
///
/// # Example
///
/// ```ignore
/// use fhir_access_persistence::access::helper;
/// use fhir_access_persistence::core::ResourceStorage;
///
/// async fn example<S: ResourceStorage>(storage: &S) -> Result<(), StorageError> {
///     let mut task = serde_json::json!({"resourceType": "Task", "status": "requested"});
///     helper::add_organization(&mut task, "partner.org")?;
///
///     let stored = storage.create("Task", task).await?;
///     let mut content = stored.content().clone();
///     content["status"] = serde_json::json!("completed");
///     let updated = storage.update(&stored, content).await?;
///     assert_eq!(updated.version_id(), "2");
///
///     storage.delete("Task", stored.id()).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ResourceStorage: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Creates a new resource.
    ///
    /// Uses the resource's `id` if present, otherwise generates one.
    ///
    /// # Errors
    ///
    /// * `StorageError::Access(InvalidTag)` - If a read access tag is malformed
    /// * `StorageError::Resource(AlreadyExists)` - If a resource with the same ID exists
    async fn create(&self, resource_type: &str, resource: Value) -> StorageResult<StoredResource>;

    /// Creates a resource with a specific ID, or updates it if it exists.
    ///
    /// Returns the stored resource and whether it was created.
    async fn create_or_update(
        &self,
        resource_type: &str,
        id: &str,
        resource: Value,
    ) -> StorageResult<(StoredResource, bool)>;

    /// Reads a resource by type and ID.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(Gone)` - If the resource was deleted
    async fn read(&self, resource_type: &str, id: &str) -> StorageResult<Option<StoredResource>>;

    /// Updates an existing resource.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the resource doesn't exist
    /// * `StorageError::Concurrency(VersionConflict)` - If the resource was modified
    /// * `StorageError::Access(InvalidTag)` - If a read access tag is malformed
    async fn update(
        &self,
        current: &StoredResource,
        resource: Value,
    ) -> StorageResult<StoredResource>;

    /// Deletes a resource (soft delete) and all of its access index rows.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the resource doesn't exist or is already deleted
    async fn delete(&self, resource_type: &str, id: &str) -> StorageResult<()>;

    /// Checks if a live resource exists.
    async fn exists(&self, resource_type: &str, id: &str) -> StorageResult<bool> {
        match self.read(resource_type, id).await {
            Ok(found) => Ok(found.is_some()),
            Err(crate::error::StorageError::Resource(crate::error::ResourceError::Gone {
                ..
            })) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Counts the non-deleted resources of a type, or of all types.
    async fn count(&self, resource_type: Option<&str>) -> StorageResult<u64>;
}
