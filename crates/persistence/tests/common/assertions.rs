//! Assertion helpers over the read access index.

use fhir_access_persistence::access::{AccessIndexRow, AccessKind};
use fhir_access_persistence::backends::sqlite::SqliteBackend;
use fhir_access_persistence::core::{AccessControlledSearch, AccessIndexProvider};
use fhir_access_persistence::error::{AccessError, StorageError};
use fhir_access_persistence::identity::Identity;
use fhir_access_persistence::types::SearchQuery;

/// Returns the index rows of a resource.
pub async fn rows_of(backend: &SqliteBackend, resource_id: &str) -> Vec<AccessIndexRow> {
    backend
        .read_access_rows(resource_id)
        .await
        .expect("Failed to read access rows")
}

/// Asserts the exact index rows of a resource, in any order.
pub async fn assert_rows(backend: &SqliteBackend, resource_id: &str, expected: &[AccessIndexRow]) {
    let mut expected = expected.to_vec();
    expected.sort();
    let actual = rows_of(backend, resource_id).await;
    assert_eq!(
        actual, expected,
        "Index rows of {} mismatch",
        resource_id
    );
}

/// Asserts that a resource has no index rows.
pub async fn assert_no_rows(backend: &SqliteBackend, resource_id: &str) {
    assert_rows(backend, resource_id, &[]).await;
}

/// Asserts the number of rows of one kind for a resource.
pub async fn assert_row_count(
    backend: &SqliteBackend,
    resource_id: &str,
    kind: AccessKind,
    expected: u64,
) {
    let count = backend
        .count_read_access(Some(resource_id), Some(kind))
        .await
        .expect("Failed to count access rows");
    assert_eq!(
        count, expected,
        "Expected {} {} rows for {}, got {}",
        expected, kind, resource_id, count
    );
}

/// Asserts that the audit finds no inconsistencies.
pub async fn assert_index_consistent(backend: &SqliteBackend) {
    let audit = backend
        .verify_access_index()
        .await
        .expect("Failed to audit access index");
    assert!(
        audit.is_consistent(),
        "Expected a consistent index, found: {:?}",
        audit.findings
    );
}

/// Returns the ids of all `resource_type` resources `identity` can find, sorted.
pub async fn visible_ids(
    backend: &SqliteBackend,
    identity: &Identity,
    resource_type: &str,
) -> Vec<String> {
    let page = backend
        .search(identity, &SearchQuery::new(resource_type).with_count(1000))
        .await
        .expect("Search failed");
    let mut ids: Vec<String> = page.items.iter().map(|r| r.id().to_string()).collect();
    ids.sort();
    ids
}

/// Asserts whether `identity` can read a resource by id.
pub async fn assert_readable(
    backend: &SqliteBackend,
    identity: &Identity,
    resource_type: &str,
    id: &str,
    readable: bool,
) {
    let result = backend.read_as(identity, resource_type, id).await;
    match (readable, result) {
        (true, Ok(resource)) => assert_eq!(resource.id(), id),
        (false, Err(StorageError::Access(AccessError::AuthorizationDenied { .. }))) => {}
        (true, Err(e)) => panic!("Expected {}/{} to be readable, got {:?}", resource_type, id, e),
        (false, other) => panic!(
            "Expected {}/{} to be denied, got {:?}",
            resource_type, id, other
        ),
    }
}
