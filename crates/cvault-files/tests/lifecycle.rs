//! Integration test: save → list → download → delete against the in-memory
//! object store, with injected store faults for the partial-failure paths.

mod common;

use std::collections::HashSet;

use common::{fast_config, flaky_manager, FlakyStore};
use cvault_core::{FileFilter, VaultError};
use cvault_files::{DeleteStage, FileManager, SaveStage, UploadFile};
use cvault_meta::{JsonMetadataStore, MemoryMetadataStore, MetadataStore, ReferenceCheck};
use cvault_storage::ObjectStore;
use tempfile::TempDir;

fn text(name: &str, body: &[u8]) -> UploadFile {
    UploadFile::from_bytes(name, "text/plain", body.to_vec())
}

#[tokio::test]
async fn save_then_download_roundtrip() {
    let (m, store) = flaky_manager();
    let body = b"0123456789";

    let saved = m
        .save_files(vec![text("abc.txt", body)], "u1", 5, Some("ev1"))
        .await;

    assert_eq!(saved.len(), 1);
    let record = &saved[0];
    assert_eq!(record.storage_key, "{5-ev1}abc.txt");
    assert_eq!(record.owner_id, "u1");
    assert_eq!(record.patient_id, 5);
    assert_eq!(record.event_id.as_deref(), Some("ev1"));
    assert_eq!(record.display_name(), "abc.txt");

    // 10 bytes of plaintext pad to a single block
    let stored = store.get("{5-ev1}abc.txt").await.unwrap();
    assert_eq!(stored.body.len(), 16);
    assert_ne!(&stored.body[..10], body);

    let file = m.download_file(&record.id, "u1").await.unwrap();
    assert_eq!(file.plaintext, body);
    assert_eq!(file.filename, "abc.txt");
    assert_eq!(file.content_type, "text/plain");
}

#[tokio::test]
async fn empty_file_roundtrips() {
    let (m, _store) = flaky_manager();
    let saved = m.save_files(vec![text("empty.txt", b"")], "u1", 5, None).await;
    let file = m.download_file(&saved[0].id, "u1").await.unwrap();
    assert!(file.plaintext.is_empty());
}

#[tokio::test]
async fn partial_save_keeps_siblings() {
    let (m, store) = flaky_manager();
    store.fail_put("{5-ev1}f2.txt");

    let report = m
        .save_files_report(
            vec![text("f1.txt", b"one"), text("f2.txt", b"two")],
            "u1",
            5,
            Some("ev1"),
        )
        .await;

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].storage_key, "{5-ev1}f1.txt");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, "f2.txt");
    assert_eq!(report.failed[0].stage, SaveStage::Uploading);

    assert!(store.exists("{5-ev1}f1.txt").await.unwrap());
    assert!(!store.exists("{5-ev1}f2.txt").await.unwrap());

    let listed = m.fetch_files(&FileFilter::ByEvent("ev1".into())).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn resaving_a_live_name_is_a_conflict() {
    let (m, store) = flaky_manager();
    let first = m
        .save_files(vec![text("abc.txt", b"original")], "u1", 5, Some("ev1"))
        .await;
    assert_eq!(first.len(), 1);

    let report = m
        .save_files_report(vec![text("abc.txt", b"replacement")], "u2", 5, Some("ev1"))
        .await;
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed[0].stage, SaveStage::Requested);
    assert!(matches!(report.failed[0].error, VaultError::Conflict(_)));

    // the first record still decrypts to its own bytes
    let file = m.download_file(&first[0].id, "u1").await.unwrap();
    assert_eq!(file.plaintext, b"original");
    let listed = m
        .fetch_files(&FileFilter::ByEvent("ev1".into()))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(store.exists("{5-ev1}abc.txt").await.unwrap());
}

#[tokio::test]
async fn name_is_reusable_after_delete() {
    let (m, _store) = flaky_manager();
    let first = m
        .save_files(vec![text("abc.txt", b"v1")], "u1", 5, Some("ev1"))
        .await;
    assert_eq!(m.delete_files(&[first[0].id.clone()], "u1").await.len(), 1);

    let second = m
        .save_files(vec![text("abc.txt", b"v2")], "u1", 5, Some("ev1"))
        .await;
    assert_eq!(second.len(), 1);
    let file = m.download_file(&second[0].id, "u1").await.unwrap();
    assert_eq!(file.plaintext, b"v2");
}

#[tokio::test]
async fn repeated_name_within_one_batch_keeps_the_first() {
    let store = FlakyStore::new();
    let mut config = fast_config();
    config.concurrency = 4;
    let m = FileManager::new(store, MemoryMetadataStore::new(), config);

    let report = m
        .save_files_report(
            vec![
                text("abc.txt", b"first"),
                text("other.txt", b"other"),
                text("abc.txt", b"second"),
            ],
            "u1",
            5,
            Some("ev1"),
        )
        .await;

    let names: Vec<String> = report.succeeded.iter().map(|r| r.display_name()).collect();
    assert_eq!(names, ["abc.txt", "other.txt"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, "abc.txt");
    assert_eq!(report.failed[0].stage, SaveStage::Requested);
    assert!(matches!(report.failed[0].error, VaultError::Conflict(_)));

    let file = m.download_file(&report.succeeded[0].id, "u1").await.unwrap();
    assert_eq!(file.plaintext, b"first");
}

#[tokio::test]
async fn same_name_under_other_event_is_independent() {
    let (m, _store) = flaky_manager();
    let a = m
        .save_files(vec![text("abc.txt", b"a")], "u1", 5, Some("ev1"))
        .await;
    let b = m
        .save_files(vec![text("abc.txt", b"b")], "u1", 5, Some("ev2"))
        .await;
    assert_eq!((a.len(), b.len()), (1, 1));
    assert_ne!(a[0].storage_key, b[0].storage_key);
}

#[tokio::test]
async fn metadata_failure_leaves_orphan_object_only() {
    let refs = ReferenceCheck {
        owners: Some(HashSet::from(["u1".to_string()])),
        patients: None,
    };
    let store = FlakyStore::new();
    let m = FileManager::new(
        store.clone(),
        MemoryMetadataStore::with_references(refs),
        fast_config(),
    );

    let report = m
        .save_files_report(vec![text("a.txt", b"x")], "stranger", 5, None)
        .await;

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed[0].stage, SaveStage::Uploading);
    assert!(matches!(report.failed[0].error, VaultError::Metadata(_)));
    assert!(store.exists("{5}a.txt").await.unwrap());
    assert!(m.metadata().is_empty().await);
}

#[tokio::test]
async fn listings_by_owner_event_and_patient() {
    let (m, _store) = flaky_manager();
    m.save_files(vec![text("a.txt", b"a")], "u1", 5, Some("ev1")).await;
    m.save_files(vec![text("b.txt", b"b")], "u1", 5, Some("ev2")).await;
    m.save_files(vec![text("c.txt", b"c")], "u2", 6, Some("ev1")).await;

    let by_owner = m.fetch_files(&FileFilter::ByOwner("u1".into())).await.unwrap();
    assert_eq!(by_owner.len(), 2);
    assert!(by_owner.iter().all(|r| r.owner_id == "u1"));

    let by_event = m.fetch_files(&FileFilter::ByEvent("ev1".into())).await.unwrap();
    assert_eq!(by_event.len(), 2);

    let by_patient = m.fetch_files(&FileFilter::ByPatient(6)).await.unwrap();
    assert_eq!(by_patient.len(), 1);
    assert_eq!(by_patient[0].display_name(), "c.txt");

    assert!(m
        .fetch_files(&FileFilter::ByPatient(99))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn download_by_non_owner_is_unauthorized() {
    let (m, _store) = flaky_manager();
    let saved = m.save_files(vec![text("a.txt", b"secret")], "u1", 5, None).await;

    let err = m.download_file(&saved[0].id, "u2").await.unwrap_err();
    assert!(matches!(err, VaultError::Unauthorized(_)), "got {err:?}");
}

#[tokio::test]
async fn download_with_missing_object_is_not_found() {
    let (m, store) = flaky_manager();
    let saved = m.save_files(vec![text("a.txt", b"x")], "u1", 5, None).await;
    store.inner().delete(&saved[0].storage_key).await.unwrap();

    let err = m.download_file(&saved[0].id, "u1").await.unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
}

#[tokio::test]
async fn corrupted_object_is_a_decryption_error() {
    let (m, store) = flaky_manager();
    let saved = m.save_files(vec![text("a.txt", b"x")], "u1", 5, None).await;

    // not a whole number of blocks
    store
        .inner()
        .put(&saved[0].storage_key, vec![0u8; 7], "text/plain")
        .await
        .unwrap();

    let err = m.download_file(&saved[0].id, "u1").await.unwrap_err();
    assert!(matches!(err, VaultError::Decryption(_)), "got {err:?}");
}

#[tokio::test]
async fn delete_by_owner_removes_object_and_record() {
    let (m, store) = flaky_manager();
    let saved = m
        .save_files(vec![text("a.txt", b"a"), text("b.txt", b"b")], "u1", 5, None)
        .await;
    let ids: Vec<String> = saved.iter().map(|r| r.id.clone()).collect();

    let deleted = m.delete_files(&ids, "u1").await;
    assert_eq!(deleted, ids);

    for record in &saved {
        assert!(!store.exists(&record.storage_key).await.unwrap());
        assert!(m.metadata().get(&record.id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn delete_by_non_owner_changes_nothing() {
    let (m, store) = flaky_manager();
    let saved = m.save_files(vec![text("a.txt", b"a")], "u1", 5, None).await;

    let report = m.delete_files_report(&[saved[0].id.clone()], "u2").await;
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed[0].stage, DeleteStage::Persisted);
    assert!(matches!(report.failed[0].error, VaultError::Unauthorized(_)));

    assert!(store.exists(&saved[0].storage_key).await.unwrap());
    assert!(m.metadata().get(&saved[0].id).await.unwrap().is_some());
}

#[tokio::test]
async fn failed_object_delete_keeps_record() {
    let (m, store) = flaky_manager();
    let saved = m
        .save_files(vec![text("a.txt", b"a"), text("b.txt", b"b")], "u1", 5, None)
        .await;
    store.fail_delete(&saved[1].storage_key);

    let ids = vec![saved[0].id.clone(), saved[1].id.clone()];
    let report = m.delete_files_report(&ids, "u1").await;

    assert_eq!(report.succeeded, vec![saved[0].id.clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, saved[1].id);
    assert_eq!(report.failed[0].stage, DeleteStage::ObjectDeleting);

    // b is still listed and still downloadable
    assert!(store.exists(&saved[1].storage_key).await.unwrap());
    let file = m.download_file(&saved[1].id, "u1").await.unwrap();
    assert_eq!(file.plaintext, b"b");
}

#[tokio::test]
async fn unconfirmed_delete_times_out_and_keeps_record() {
    let (m, store) = flaky_manager();
    let saved = m.save_files(vec![text("ghost.txt", b"g")], "u1", 5, None).await;
    store.ignore_delete(&saved[0].storage_key);

    let report = m.delete_files_report(&[saved[0].id.clone()], "u1").await;

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed[0].stage, DeleteStage::ObjectDeleting);
    assert!(matches!(
        report.failed[0].error,
        VaultError::ConfirmationTimeout { .. }
    ));
    assert!(m.metadata().get(&saved[0].id).await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_batches_keep_input_order() {
    let store = FlakyStore::new();
    let mut config = fast_config();
    config.concurrency = 4;
    let m = FileManager::new(store, MemoryMetadataStore::new(), config);

    let files: Vec<UploadFile> = (0..10)
        .map(|i| text(&format!("f{i}.txt"), format!("body {i}").as_bytes()))
        .collect();
    let saved = m.save_files(files, "u1", 5, Some("ev1")).await;

    let names: Vec<String> = saved.iter().map(|r| r.display_name()).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("f{i}.txt")).collect();
    assert_eq!(names, expected);

    let ids: Vec<String> = saved.iter().map(|r| r.id.clone()).collect();
    assert_eq!(m.delete_files(&ids, "u1").await, ids);
}

#[tokio::test]
async fn json_store_with_path_sources() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("scan.pdf");
    std::fs::write(&src, b"%PDF-1.7 discharge summary").unwrap();
    let records = tmp.path().join("meta/records.json");

    let store = FlakyStore::new();
    let meta = JsonMetadataStore::open(&records, ReferenceCheck::default())
        .await
        .unwrap();
    let m = FileManager::new(store.clone(), meta, fast_config());

    let saved = m
        .save_files(
            vec![
                UploadFile::from_path("scan.pdf", "application/pdf", src),
                UploadFile::from_path("missing.pdf", "application/pdf", tmp.path().join("nope")),
            ],
            "u1",
            7,
            Some("ev9"),
        )
        .await;
    assert_eq!(saved.len(), 1);
    assert!(records.exists());

    // A second manager over the same file sees the record
    let reopened = JsonMetadataStore::open(&records, ReferenceCheck::default())
        .await
        .unwrap();
    let m2 = FileManager::new(store, reopened, fast_config());
    let file = m2.download_file(&saved[0].id, "u1").await.unwrap();
    assert_eq!(file.plaintext, b"%PDF-1.7 discharge summary");
    assert_eq!(file.content_type, "application/pdf");
    assert_eq!(file.filename, "scan.pdf");
}
