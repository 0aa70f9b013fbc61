//! Tests for rollback of writes whose index maintenance fails.
//!
//! A trigger on `read_access` aborts index inserts for one resource. The
//! failing write must leave neither the resource nor any index row behind.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use fhir_access_persistence::access::{AccessIndexRow, AccessKind, AccessTag, helper};
use fhir_access_persistence::backends::sqlite::SqliteBackend;
use fhir_access_persistence::core::{AccessIndexProvider, ResourceStorage};
use fhir_access_persistence::error::{AccessError, StorageError};

use crate::common::*;

fn file_backend() -> (TempDir, PathBuf, SqliteBackend) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("fhir.db");
    let backend = SqliteBackend::open(&path).expect("Failed to open SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    (dir, path, backend)
}

/// Makes every `read_access` insert for `resource_id` abort.
fn reject_index_rows_for(path: &Path, resource_id: &str) {
    let conn = rusqlite::Connection::open(path).expect("Failed to open database");
    conn.execute_batch(&format!(
        "CREATE TRIGGER \"reject_{0}\" BEFORE INSERT ON read_access
         WHEN NEW.resource_id = '{0}'
         BEGIN SELECT RAISE(ABORT, 'index insert rejected'); END;",
        resource_id
    ))
    .expect("Failed to create trigger");
}

fn allow_index_rows_for(path: &Path, resource_id: &str) {
    let conn = rusqlite::Connection::open(path).expect("Failed to open database");
    conn.execute_batch(&format!("DROP TRIGGER \"reject_{}\";", resource_id))
        .expect("Failed to drop trigger");
}

/// Resource count and index row count.
async fn totals(backend: &SqliteBackend) -> (u64, u64) {
    let resources = backend.count(None).await.unwrap();
    let rows = backend.count_read_access(None, None).await.unwrap();
    (resources, rows)
}

fn assert_index_failure(err: &StorageError) {
    assert!(
        matches!(
            err,
            StorageError::Access(AccessError::IndexInconsistency { .. })
        ),
        "Expected an index failure, got {:?}",
        err
    );
}

// ============================================================================
// Failed Resource Writes
// ============================================================================

#[tokio::test]
async fn test_failed_create_leaves_no_resource_or_rows() {
    let (_dir, path, backend) = file_backend();
    backend
        .create_or_update("Task", "kept", task_for_all("kept"))
        .await
        .unwrap();
    reject_index_rows_for(&path, "failing");
    let before = totals(&backend).await;

    let err = backend
        .create_or_update("Task", "failing", task_for_all("failing"))
        .await
        .unwrap_err();
    assert_index_failure(&err);

    assert_eq!(totals(&backend).await, before);
    assert!(backend.read("Task", "failing").await.unwrap().is_none());
    assert!(backend.declared_access_tags("failing").await.unwrap().is_empty());
    assert_no_rows(&backend, "failing").await;
    assert_rows(&backend, "kept", &[AccessIndexRow::unbound("kept", AccessKind::All)]).await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_failed_update_keeps_previous_version_and_rows() {
    let (_dir, path, backend) = file_backend();
    backend
        .create_or_update("Task", "stable", local_task("stable"))
        .await
        .unwrap();
    reject_index_rows_for(&path, "stable");
    let before = totals(&backend).await;

    let err = backend
        .create_or_update("Task", "stable", task_for_all("stable"))
        .await
        .unwrap_err();
    assert_index_failure(&err);

    let current = backend.read("Task", "stable").await.unwrap().unwrap();
    assert_eq!(current.version_id(), "1");
    assert_eq!(
        helper::access_tags(current.content()).unwrap(),
        vec![AccessTag::Local]
    );
    assert_eq!(
        backend.declared_access_tags("stable").await.unwrap(),
        vec![AccessTag::Local]
    );
    assert_eq!(totals(&backend).await, before);
    assert_rows(&backend, "stable", &[AccessIndexRow::unbound("stable", AccessKind::Local)]).await;
    assert_index_consistent(&backend).await;
}

// ============================================================================
// Failed Organization Writes
// ============================================================================

#[tokio::test]
async fn test_failed_organization_write_rolls_back_dependent_grants() {
    let (_dir, path, backend) = file_backend();
    backend
        .create_or_update("Task", "pending", task_for_organizations("pending", &["org.com"]))
        .await
        .unwrap();
    assert_no_rows(&backend, "pending").await;
    reject_index_rows_for(&path, "pending");
    let before = totals(&backend).await;

    let organization = OrganizationFixture::new("org", "org.com");
    let err = backend
        .create_or_update("Organization", "org", organization.to_json())
        .await
        .unwrap_err();
    assert_index_failure(&err);

    assert!(backend.read("Organization", "org").await.unwrap().is_none());
    assert_eq!(totals(&backend).await, before);
    assert_no_rows(&backend, "pending").await;
    assert_index_consistent(&backend).await;

    allow_index_rows_for(&path, "pending");
    backend
        .create_or_update("Organization", "org", organization.to_json())
        .await
        .unwrap();
    assert_rows(&backend, "pending", &[AccessIndexRow::organization("pending", "org")]).await;
}

#[tokio::test]
async fn test_failed_affiliation_write_rolls_back_role_grant() {
    let (_dir, path, backend) = file_backend();
    for organization in [
        OrganizationFixture::new("parent", "parent.org"),
        OrganizationFixture::new("member", "member.org"),
    ] {
        backend
            .create_or_update("Organization", &organization.id, organization.to_json())
            .await
            .unwrap();
    }
    backend
        .create_or_update("Task", "secret", task_for_role("secret", "parent.org", "DIC"))
        .await
        .unwrap();
    reject_index_rows_for(&path, "secret");
    let before = totals(&backend).await;

    let affiliation = AffiliationFixture::new("aff", "parent", "member").with_role("DIC");
    let err = backend
        .create_or_update("OrganizationAffiliation", "aff", affiliation.to_json())
        .await
        .unwrap_err();
    assert_index_failure(&err);

    assert!(
        backend
            .read("OrganizationAffiliation", "aff")
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(totals(&backend).await, before);
    assert_no_rows(&backend, "secret").await;
    assert_index_consistent(&backend).await;
}
