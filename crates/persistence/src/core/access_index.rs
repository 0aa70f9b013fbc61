//! Read-only access to the read access index.

use async_trait::async_trait;

use crate::access::{AccessIndexRow, AccessKind, AccessTag, IndexAudit};
use crate::error::StorageResult;

/// Inspection of the persisted read access index.
///
/// The index itself is only ever written by the store's write paths.
#[async_trait]
pub trait AccessIndexProvider: Send + Sync {
    /// Returns the index rows of a resource, ordered.
    async fn read_access_rows(&self, resource_id: &str) -> StorageResult<Vec<AccessIndexRow>>;

    /// Returns the declared read access tags stored for a resource.
    async fn declared_access_tags(&self, resource_id: &str) -> StorageResult<Vec<AccessTag>>;

    /// Counts index rows, optionally restricted to one resource and one kind.
    async fn count_read_access(
        &self,
        resource_id: Option<&str>,
        access_type: Option<AccessKind>,
    ) -> StorageResult<u64>;

    /// Recomputes the rows of every live resource and compares them with the
    /// stored index, without repairing anything.
    async fn verify_access_index(&self) -> StorageResult<IndexAudit>;
}
