//! Read access index maintenance tests.
//!
//! These tests drive the SQLite backend through resource, organization and
//! affiliation writes and verify the resulting `read_access` rows.

#![cfg(feature = "sqlite")]

mod common;

use serde_json::json;

use common::*;
use fhir_access_persistence::access::{
    AccessIndexRow, AccessKind, AccessTag, Identifier, READ_ACCESS_TAG_SYSTEM, helper,
};
use fhir_access_persistence::backends::sqlite::SqliteBackend;
use fhir_access_persistence::core::{AccessIndexProvider, ResourceStorage};
use fhir_access_persistence::error::{AccessError, ResourceError, StorageError};

async fn store(backend: &SqliteBackend, resource_type: &str, resource: serde_json::Value) {
    let id = resource["id"].as_str().expect("fixture id").to_string();
    backend
        .create_or_update(resource_type, &id, resource)
        .await
        .expect("Failed to store resource");
}

async fn store_organization(backend: &SqliteBackend, organization: &OrganizationFixture) {
    store(backend, "Organization", organization.to_json()).await;
}

async fn store_affiliation(backend: &SqliteBackend, affiliation: &AffiliationFixture) {
    store(backend, "OrganizationAffiliation", affiliation.to_json()).await;
}

/// Parent `parent.org`, member `member.org` and affiliation `aff` granting DIC.
async fn role_setup(backend: &SqliteBackend) -> (OrganizationFixture, OrganizationFixture, AffiliationFixture) {
    let parent = OrganizationFixture::new("parent", "parent.org");
    let member = OrganizationFixture::new("member", "member.org");
    let affiliation = AffiliationFixture::new("aff", "parent", "member").with_role("DIC");
    store_organization(backend, &parent).await;
    store_organization(backend, &member).await;
    store_affiliation(backend, &affiliation).await;
    (parent, member, affiliation)
}

// ============================================================================
// Unbound Tags
// ============================================================================

#[tokio::test]
async fn test_all_and_local_rows() {
    let backend = create_backend();

    store(&backend, "Task", task_for_all("t-all")).await;
    store(&backend, "Task", local_task("t-local")).await;
    store(&backend, "Task", task("t-none")).await;

    assert_rows(&backend, "t-all", &[AccessIndexRow::unbound("t-all", AccessKind::All)]).await;
    assert_rows(
        &backend,
        "t-local",
        &[AccessIndexRow::unbound("t-local", AccessKind::Local)],
    )
    .await;
    assert_no_rows(&backend, "t-none").await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_duplicate_tags_collapse_to_one_row() {
    let backend = create_backend();
    let mut resource = local_task("t1");
    resource["meta"]["tag"]
        .as_array_mut()
        .unwrap()
        .push(json!({"system": READ_ACCESS_TAG_SYSTEM, "code": "LOCAL"}));

    store(&backend, "Task", resource).await;

    assert_row_count(&backend, "t1", AccessKind::Local, 1).await;
    assert_eq!(
        backend.declared_access_tags("t1").await.unwrap(),
        vec![AccessTag::Local]
    );
}

#[tokio::test]
async fn test_rewriting_same_content_is_idempotent() {
    let backend = create_backend();
    store_organization(&backend, &OrganizationFixture::new("org", "org.com")).await;

    let resource = task_for_organizations("t1", &["org.com"]);
    store(&backend, "Task", resource.clone()).await;
    let before = rows_of(&backend, "t1").await;

    store(&backend, "Task", resource.clone()).await;
    store(&backend, "Task", resource).await;

    assert_eq!(rows_of(&backend, "t1").await, before);
    assert_index_consistent(&backend).await;
}

// ============================================================================
// Organization Tags
// ============================================================================

#[tokio::test]
async fn test_two_organization_tags_give_two_rows() {
    let backend = create_backend();
    store_organization(&backend, &OrganizationFixture::new("org-a", "a.org")).await;
    store_organization(&backend, &OrganizationFixture::new("org-b", "b.org")).await;

    store(&backend, "Task", task_for_organizations("t1", &["a.org", "b.org"])).await;

    assert_rows(
        &backend,
        "t1",
        &[
            AccessIndexRow::organization("t1", "org-a"),
            AccessIndexRow::organization("t1", "org-b"),
        ],
    )
    .await;
    // No implicit LOCAL row
    assert_row_count(&backend, "t1", AccessKind::Local, 0).await;
}

#[tokio::test]
async fn test_two_organizations_removed_independently() {
    let backend = create_backend();
    let x = OrganizationFixture::new("org-x", "x.org");
    let y = OrganizationFixture::new("org-y", "y.org");
    store_organization(&backend, &x).await;
    store_organization(&backend, &y).await;

    let mut resource = task_for_organizations("t1", &["x.org", "y.org"]);
    helper::add_local(&mut resource).unwrap();
    store(&backend, "Task", resource).await;
    assert_row_count(&backend, "t1", AccessKind::Organization, 2).await;

    store_organization(&backend, &x.clone().with_active(false)).await;
    assert_rows(
        &backend,
        "t1",
        &[
            AccessIndexRow::unbound("t1", AccessKind::Local),
            AccessIndexRow::organization("t1", "org-y"),
        ],
    )
    .await;

    store_organization(&backend, &y.with_active(false)).await;
    assert_rows(&backend, "t1", &[AccessIndexRow::unbound("t1", AccessKind::Local)]).await;

    store_organization(&backend, &x).await;
    assert_rows(
        &backend,
        "t1",
        &[
            AccessIndexRow::unbound("t1", AccessKind::Local),
            AccessIndexRow::organization("t1", "org-x"),
        ],
    )
    .await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_organization_tag_before_organization_exists() {
    let backend = create_backend();

    store(&backend, "Task", task_for_organizations("t1", &["late.org"])).await;
    assert_no_rows(&backend, "t1").await;

    store_organization(&backend, &OrganizationFixture::new("late", "late.org")).await;
    assert_rows(&backend, "t1", &[AccessIndexRow::organization("t1", "late")]).await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_organization_deactivation_and_reactivation() {
    let backend = create_backend();
    let organization = OrganizationFixture::new("org", "org.com");
    store_organization(&backend, &organization).await;
    store(&backend, "Task", task_for_organizations("t1", &["org.com"])).await;
    assert_row_count(&backend, "t1", AccessKind::Organization, 1).await;

    store_organization(&backend, &organization.clone().with_active(false)).await;
    assert_no_rows(&backend, "t1").await;
    assert_index_consistent(&backend).await;

    store_organization(&backend, &organization).await;
    assert_rows(&backend, "t1", &[AccessIndexRow::organization("t1", "org")]).await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_organization_identifier_change_moves_grant() {
    let backend = create_backend();
    store_organization(&backend, &OrganizationFixture::new("org", "old.org")).await;
    store(&backend, "Task", task_for_organizations("t-old", &["old.org"])).await;
    store(&backend, "Task", task_for_organizations("t-new", &["new.org"])).await;

    store_organization(&backend, &OrganizationFixture::new("org", "new.org")).await;

    assert_no_rows(&backend, "t-old").await;
    assert_rows(&backend, "t-new", &[AccessIndexRow::organization("t-new", "org")]).await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_deleting_organization_removes_dependent_rows() {
    let backend = create_backend();
    role_setup(&backend).await;
    store(&backend, "Task", task_for_organizations("t-org", &["member.org"])).await;
    store(&backend, "Task", task_for_role("t-role", "parent.org", "DIC")).await;
    assert_row_count(&backend, "t-org", AccessKind::Organization, 1).await;
    assert_row_count(&backend, "t-role", AccessKind::Role, 1).await;

    backend.delete("Organization", "member").await.unwrap();

    assert_no_rows(&backend, "t-org").await;
    assert_no_rows(&backend, "t-role").await;
    assert_index_consistent(&backend).await;
}

// ============================================================================
// Role Tags
// ============================================================================

#[tokio::test]
async fn test_role_tag_resolves_through_affiliation() {
    let backend = create_backend();
    role_setup(&backend).await;

    store(&backend, "Task", task_for_role("t1", "parent.org", "DIC")).await;

    assert_rows(&backend, "t1", &[AccessIndexRow::role("t1", "member", "aff")]).await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_role_tag_written_before_any_organization() {
    let backend = create_backend();
    store(&backend, "Task", task_for_role("r", "parent.com", "MeDIC")).await;
    assert_row_count(&backend, "r", AccessKind::Role, 0).await;

    let parent = OrganizationFixture::new("parent", "parent.com");
    let member = OrganizationFixture::new("member", "member.com");
    store_organization(&backend, &parent).await;
    store_organization(&backend, &member).await;
    store_affiliation(
        &backend,
        &AffiliationFixture::new("aff", "parent", "member").with_role("MeDIC"),
    )
    .await;
    assert_rows(&backend, "r", &[AccessIndexRow::role("r", "member", "aff")]).await;

    store_organization(&backend, &parent.clone().with_active(false)).await;
    assert_row_count(&backend, "r", AccessKind::Role, 0).await;
    store_organization(&backend, &member.clone().with_active(false)).await;
    assert_row_count(&backend, "r", AccessKind::Role, 0).await;

    store_organization(&backend, &parent).await;
    assert_row_count(&backend, "r", AccessKind::Role, 0).await;
    store_organization(&backend, &member).await;
    assert_rows(&backend, "r", &[AccessIndexRow::role("r", "member", "aff")]).await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_role_tag_written_before_affiliation() {
    let backend = create_backend();
    store_organization(&backend, &OrganizationFixture::new("parent", "parent.org")).await;
    store_organization(&backend, &OrganizationFixture::new("member", "member.org")).await;
    store(&backend, "Task", task_for_role("t1", "parent.org", "DIC")).await;
    assert_no_rows(&backend, "t1").await;

    store_affiliation(
        &backend,
        &AffiliationFixture::new("aff", "parent", "member").with_role("DIC"),
    )
    .await;
    assert_rows(&backend, "t1", &[AccessIndexRow::role("t1", "member", "aff")]).await;
}

#[tokio::test]
async fn test_role_follows_affiliation_code() {
    let backend = create_backend();
    let (_, _, affiliation) = role_setup(&backend).await;
    store(&backend, "Task", task_for_role("t1", "parent.org", "DIC")).await;

    store_affiliation(&backend, &affiliation.clone().with_roles(&["TTP"])).await;
    assert_no_rows(&backend, "t1").await;

    store_affiliation(&backend, &affiliation.with_roles(&["TTP", "DIC"])).await;
    assert_rows(&backend, "t1", &[AccessIndexRow::role("t1", "member", "aff")]).await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_role_follows_affiliation_activity() {
    let backend = create_backend();
    let (_, _, affiliation) = role_setup(&backend).await;
    store(&backend, "Task", task_for_role("t1", "parent.org", "DIC")).await;

    store_affiliation(&backend, &affiliation.clone().with_active(false)).await;
    assert_no_rows(&backend, "t1").await;

    store_affiliation(&backend, &affiliation).await;
    assert_row_count(&backend, "t1", AccessKind::Role, 1).await;

    backend
        .delete("OrganizationAffiliation", "aff")
        .await
        .unwrap();
    assert_no_rows(&backend, "t1").await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_role_follows_member_activity() {
    let backend = create_backend();
    let (_, member, _) = role_setup(&backend).await;
    store(&backend, "Task", task_for_role("t1", "parent.org", "DIC")).await;

    store_organization(&backend, &member.clone().with_active(false)).await;
    assert_no_rows(&backend, "t1").await;

    store_organization(&backend, &member).await;
    assert_rows(&backend, "t1", &[AccessIndexRow::role("t1", "member", "aff")]).await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_role_follows_parent_activity() {
    let backend = create_backend();
    let (parent, _, _) = role_setup(&backend).await;
    store(&backend, "Task", task_for_role("t1", "parent.org", "DIC")).await;

    store_organization(&backend, &parent.clone().with_active(false)).await;
    assert_no_rows(&backend, "t1").await;

    store_organization(&backend, &parent).await;
    assert_rows(&backend, "t1", &[AccessIndexRow::role("t1", "member", "aff")]).await;
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_role_with_two_members() {
    let backend = create_backend();
    role_setup(&backend).await;
    store_organization(&backend, &OrganizationFixture::new("member-2", "member2.org")).await;
    store_affiliation(
        &backend,
        &AffiliationFixture::new("aff-2", "parent", "member-2").with_role("DIC"),
    )
    .await;

    store(&backend, "Task", task_for_role("t1", "parent.org", "DIC")).await;

    assert_rows(
        &backend,
        "t1",
        &[
            AccessIndexRow::role("t1", "member", "aff"),
            AccessIndexRow::role("t1", "member-2", "aff-2"),
        ],
    )
    .await;
}

// ============================================================================
// Resource Lifecycle
// ============================================================================

#[tokio::test]
async fn test_clearing_tags_removes_rows() {
    let backend = create_backend();
    store(&backend, "Task", task_for_all("t1")).await;

    let current = backend.read("Task", "t1").await.unwrap().unwrap();
    let mut content = current.content().clone();
    helper::remove_all(&mut content);
    backend.update(&current, content).await.unwrap();

    assert_no_rows(&backend, "t1").await;
    assert!(backend.declared_access_tags("t1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_changing_tags_replaces_rows() {
    let backend = create_backend();
    store(&backend, "Task", task_for_all("t1")).await;
    store(&backend, "Task", local_task("t1")).await;

    assert_rows(&backend, "t1", &[AccessIndexRow::unbound("t1", AccessKind::Local)]).await;
}

#[tokio::test]
async fn test_delete_removes_rows_and_tags() {
    let backend = create_backend();
    store(&backend, "Task", task_for_all("t1")).await;

    backend.delete("Task", "t1").await.unwrap();

    assert_no_rows(&backend, "t1").await;
    assert!(backend.declared_access_tags("t1").await.unwrap().is_empty());
    assert_eq!(backend.count_read_access(None, None).await.unwrap(), 0);
    assert_index_consistent(&backend).await;
}

#[tokio::test]
async fn test_malformed_tag_rejects_write() {
    let backend = create_backend();
    let resource = json!({
        "resourceType": "Task",
        "id": "t1",
        "meta": {"tag": [{"system": READ_ACCESS_TAG_SYSTEM, "code": "ORGANIZATION"}]}
    });

    let err = backend
        .create_or_update("Task", "t1", resource)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Access(AccessError::InvalidTag { .. })
    ));
    assert_eq!(backend.count(Some("Task")).await.unwrap(), 0);
    assert_eq!(backend.count_read_access(None, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_tag_code_rejects_write() {
    let backend = create_backend();
    let resource = json!({
        "resourceType": "Task",
        "meta": {"tag": [{"system": READ_ACCESS_TAG_SYSTEM, "code": "EVERYONE"}]}
    });

    let err = backend.create("Task", resource).await.unwrap_err();
    assert!(matches!(err, StorageError::Access(_)));
}

#[tokio::test]
async fn test_ids_are_unique_across_types() {
    let backend = create_backend();
    store(&backend, "Task", task_for_all("shared")).await;

    let err = backend
        .create("Organization", json!({"id": "shared", "active": true}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Resource(ResourceError::AlreadyExists { .. })
    ));
    assert_rows(&backend, "shared", &[AccessIndexRow::unbound("shared", AccessKind::All)]).await;
}

#[tokio::test]
async fn test_organization_resources_carry_their_own_tags() {
    let backend = create_backend();
    let mut organization = OrganizationFixture::new("org", "org.com").to_json();
    helper::add_all(&mut organization).unwrap();

    store(&backend, "Organization", organization).await;

    assert_rows(&backend, "org", &[AccessIndexRow::unbound("org", AccessKind::All)]).await;
    assert_eq!(
        backend.declared_access_tags("org").await.unwrap(),
        vec![AccessTag::All]
    );

    let stored = backend.read("Organization", "org").await.unwrap().unwrap();
    assert_eq!(
        helper::organization_identifier(stored.content()),
        Some(Identifier::organization("org.com"))
    );
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fhir.db");

    {
        let backend = SqliteBackend::open(&path).unwrap();
        backend.init_schema().unwrap();
        store_organization(&backend, &OrganizationFixture::new("org", "org.com")).await;
        store(&backend, "Task", task_for_organizations("t1", &["org.com"])).await;
    }

    let backend = SqliteBackend::open(&path).unwrap();
    backend.init_schema().unwrap();
    assert_rows(&backend, "t1", &[AccessIndexRow::organization("t1", "org")]).await;
    assert_index_consistent(&backend).await;
}
