//! Tests for concurrent writers on a file-backed database.
//!
//! Organization activation toggles, affiliation toggles and tagged resource
//! writes run in parallel while an auditor repeatedly checks the index. Every
//! audit runs against one committed snapshot and must never observe a
//! resource write without its index change.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fhir_access_persistence::access::{AccessKind, helper};
use fhir_access_persistence::backends::sqlite::SqliteBackend;
use fhir_access_persistence::core::{AccessIndexProvider, ResourceStorage};

use crate::common::*;

const ORGANIZATIONS: usize = 3;
const ROUNDS: usize = 10;

fn organization(index: usize, active: bool) -> OrganizationFixture {
    OrganizationFixture::new(format!("org-{}", index), format!("org-{}.org", index))
        .with_active(active)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_and_tagged_writes_keep_index_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SqliteBackend::open(dir.path().join("fhir.db")).unwrap());
    backend.init_schema().unwrap();

    let parent = OrganizationFixture::new("parent", "parent.org");
    backend
        .create_or_update("Organization", "parent", parent.to_json())
        .await
        .unwrap();
    for i in 0..ORGANIZATIONS {
        let organization = organization(i, true);
        backend
            .create_or_update("Organization", &organization.id, organization.to_json())
            .await
            .unwrap();
    }
    let affiliation = AffiliationFixture::new("aff", "parent", "org-0").with_role("DIC");
    backend
        .create_or_update("OrganizationAffiliation", "aff", affiliation.to_json())
        .await
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let auditor = {
        let backend = Arc::clone(&backend);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut audits = 0usize;
            while !done.load(Ordering::Acquire) {
                let audit = backend.verify_access_index().await.expect("audit");
                assert!(
                    audit.is_consistent(),
                    "Audit observed a partial write: {:?}",
                    audit.findings
                );
                audits += 1;
                tokio::task::yield_now().await;
            }
            audits
        })
    };

    let mut writers = Vec::new();
    for i in 0..ORGANIZATIONS {
        let backend = Arc::clone(&backend);
        writers.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let organization = organization(i, round % 2 == 1);
                backend
                    .create_or_update("Organization", &organization.id, organization.to_json())
                    .await
                    .expect("organization write");
            }
        }));
    }
    for i in 0..ORGANIZATIONS {
        let backend = Arc::clone(&backend);
        writers.push(tokio::spawn(async move {
            let identifier = format!("org-{}.org", i);
            for n in 0..ROUNDS {
                let id = format!("task-{}-{}", i, n);
                let mut resource = task_for_organizations(&id, &[identifier.as_str()]);
                helper::add_role(&mut resource, "parent.org", ROLE_SYSTEM, "DIC").unwrap();
                backend
                    .create_or_update("Task", &id, resource)
                    .await
                    .expect("task write");
            }
        }));
    }
    {
        let backend = Arc::clone(&backend);
        writers.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let affiliation = AffiliationFixture::new("aff", "parent", "org-0")
                    .with_role("DIC")
                    .with_active(round % 2 == 1);
                backend
                    .create_or_update("OrganizationAffiliation", "aff", affiliation.to_json())
                    .await
                    .expect("affiliation write");
            }
        }));
    }

    for writer in writers {
        writer.await.expect("writer panicked");
    }
    done.store(true, Ordering::Release);
    auditor.await.expect("auditor panicked");

    assert_index_consistent(&backend).await;
    let organization_rows = backend
        .count_read_access(None, Some(AccessKind::Organization))
        .await
        .unwrap();
    let role_rows = backend
        .count_read_access(None, Some(AccessKind::Role))
        .await
        .unwrap();
    assert_eq!(organization_rows, (ORGANIZATIONS * ROUNDS) as u64);
    assert_eq!(role_rows, ROUNDS as u64);
    for n in 0..ROUNDS {
        assert_row_count(&backend, &format!("task-0-{}", n), AccessKind::Role, 1).await;
        assert_row_count(&backend, &format!("task-1-{}", n), AccessKind::Role, 0).await;
    }
}
