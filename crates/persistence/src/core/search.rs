//! Reads and searches on behalf of a caller.

use async_trait::async_trait;

use crate::access::Identifier;
use crate::error::StorageResult;
use crate::identity::{Identity, LocalRole};
use crate::types::{Page, SearchQuery, StoredResource};

use super::storage::ResourceStorage;

/// Search and read restricted to what an [`Identity`] may read.
///
/// The restriction is evaluated by the store as part of the query, so paging
/// and totals only ever count readable resources.
#[async_trait]
pub trait AccessControlledSearch: ResourceStorage {
    /// Executes `query` restricted to resources `identity` may read.
    ///
    /// # Errors
    ///
    /// * `StorageError::Search(InvalidSort)` - If a sort parameter is unsupported
    async fn search(
        &self,
        identity: &Identity,
        query: &SearchQuery,
    ) -> StorageResult<Page<StoredResource>>;

    /// Reads one resource on behalf of `identity`.
    ///
    /// # Errors
    ///
    /// * `StorageError::Access(AuthorizationDenied)` - If the resource does not
    ///   exist, is deleted, or is not readable by `identity`
    async fn read_as(
        &self,
        identity: &Identity,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<StoredResource>;

    /// Builds the identity of a caller from stored organization state.
    ///
    /// With `local` set, the caller is a local identity with that role bound
    /// to the organization (if stored). Otherwise it is a remote identity
    /// carrying the roles of every active affiliation in which the
    /// organization participates. Returns `None` for a remote caller whose
    /// organization is not stored.
    async fn resolve_identity(
        &self,
        organization: &Identifier,
        local: Option<LocalRole>,
    ) -> StorageResult<Option<Identity>>;
}
