//! Functional tests for the task record store.
//!
//! These tests exercise the store as the single source of truth for job status:
//! - list() always reflects the net effect of add/update/remove.
//! - Notification happens once per state-changing mutation, never otherwise.
//! - Durable storage is best effort: failures and corrupt payloads never escape.

use jobtrack_core::{
    validate_transition, DurableStorage, FileStorage, MemoryStorage, StoreEvent, TaskId, TaskPatch,
    TaskStatus, TaskStore, TaskType, UpdateOutcome, DEFAULT_STORAGE_KEY,
};
use jobtrack_test_utils::{analysis_task, document_task, EventRecorder, FailingStorage};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Add(u8, TaskStatus),
    Update(u8, TaskStatus),
    Remove(u8),
    ClearTerminal,
}

fn status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Queued),
        Just(TaskStatus::Processing),
        Just(TaskStatus::Completed),
        Just(TaskStatus::Failed),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..5, status()).prop_map(|(id, s)| Op::Add(id, s)),
        (0u8..5, status()).prop_map(|(id, s)| Op::Update(id, s)),
        (0u8..5).prop_map(Op::Remove),
        Just(Op::ClearTerminal),
    ]
}

proptest! {
    /// Tenet: for any sequence of mutations, list() equals the net effect of
    /// that sequence, and update on a missing id never creates a record.
    #[test]
    fn list_reflects_net_effect(ops in proptest::collection::vec(op(), 0..40)) {
        let store = TaskStore::in_memory();
        let mut model: BTreeMap<String, TaskStatus> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Add(id, s) => {
                    let id = format!("t{id}");
                    store.add(analysis_task(&id).with_status(s));
                    model.insert(id, s);
                }
                Op::Update(id, s) => {
                    let id = format!("t{id}");
                    let outcome = store.update(&id, &TaskPatch::status(s));
                    match model.get(&id).copied() {
                        None => prop_assert_eq!(outcome, UpdateOutcome::Missing),
                        Some(current) if validate_transition(current, s).is_ok() => {
                            model.insert(id, s);
                        }
                        Some(_) => prop_assert!(matches!(outcome, UpdateOutcome::Rejected(_))),
                    }
                }
                Op::Remove(id) => {
                    let id = format!("t{id}");
                    prop_assert_eq!(store.remove(&id).is_some(), model.remove(&id).is_some());
                }
                Op::ClearTerminal => {
                    store.clear_terminal();
                    model.retain(|_, s| !s.is_terminal());
                }
            }
        }

        let actual: BTreeMap<String, TaskStatus> = store
            .list()
            .into_iter()
            .map(|t| (t.id.as_str().to_string(), t.status))
            .collect();
        prop_assert_eq!(actual, model);
    }
}

/// Tenet: add, then two status updates, produce exactly three notifications
/// and leave the record completed.
#[test]
fn add_then_two_updates_notifies_three_times() {
    let store = TaskStore::in_memory();
    let recorder: EventRecorder<StoreEvent> = EventRecorder::new();
    let _sub = store.subscribe(recorder.listener());

    store.add(analysis_task("t1"));
    store.update("t1", &TaskPatch::status(TaskStatus::Processing));
    store.update("t1", &TaskPatch::status(TaskStatus::Completed));

    assert_eq!(store.get("t1").unwrap().status, TaskStatus::Completed);
    assert_eq!(
        recorder.events(),
        vec![
            StoreEvent::Added("t1".into()),
            StoreEvent::Updated("t1".into()),
            StoreEvent::Updated("t1".into()),
        ]
    );
}

/// Tenet: clear_terminal removes exactly the completed and failed records and
/// a second call with nothing new to clear notifies nobody.
#[test]
fn clear_terminal_is_idempotent() {
    let store = TaskStore::in_memory();
    store.add(analysis_task("q"));
    store.add(analysis_task("p").with_status(TaskStatus::Processing));
    store.add(document_task("c").with_status(TaskStatus::Completed));
    store.add(document_task("f").with_status(TaskStatus::Failed));

    let recorder: EventRecorder<StoreEvent> = EventRecorder::new();
    let _sub = store.subscribe(recorder.listener());

    let removed = store.clear_terminal();
    assert_eq!(removed, vec![TaskId::from("c"), TaskId::from("f")]);
    assert_eq!(recorder.len(), 1);

    assert!(store.clear_terminal().is_empty());
    assert_eq!(recorder.len(), 1);

    let left: Vec<_> = store.list().into_iter().map(|t| t.id).collect();
    assert_eq!(left.len(), 2);
    assert!(store.contains("q") && store.contains("p"));
}

/// Tenet: a corrupted persisted payload yields an empty store, no panic.
#[test]
fn corrupted_payload_hydrates_empty() {
    let storage = Arc::new(MemoryStorage::new());
    storage.insert_raw(DEFAULT_STORAGE_KEY, "{not json at all");

    let store = TaskStore::with_storage(storage.clone());
    assert!(store.is_empty());

    store.add(analysis_task("fresh"));
    let reopened = TaskStore::with_storage(storage);
    assert!(reopened.contains("fresh"));
}

/// Tenet: failing durable storage never surfaces through the store API.
#[test]
fn storage_failures_are_swallowed() {
    let storage = Arc::new(FailingStorage::new());
    let store = TaskStore::with_storage(storage.clone());

    store.add(analysis_task("t1"));
    assert_eq!(
        store.update("t1", &TaskPatch::status(TaskStatus::Processing)),
        UpdateOutcome::Applied
    );
    assert_eq!(store.get("t1").unwrap().status, TaskStatus::Processing);
    assert_eq!(storage.write_attempts(), 2);
}

/// Tenet: the file-backed store survives a process restart.
#[test]
fn file_storage_round_trips_through_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = TaskStore::with_storage(Arc::new(FileStorage::new(dir.path())));
        store.add(analysis_task("a"));
        store.add(document_task("b"));
        store.update("b", &TaskPatch::status(TaskStatus::Processing));
    }

    let storage = FileStorage::new(dir.path());
    assert!(storage.get(DEFAULT_STORAGE_KEY).unwrap().is_some());

    let store = TaskStore::with_storage(Arc::new(storage));
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("b").unwrap().status, TaskStatus::Processing);
    assert_eq!(store.by_type(TaskType::DocumentGeneration).len(), 1);
    assert_eq!(
        store.find_by_metadata("repositoryId", &serde_json::json!(1)).len(),
        1
    );
}
