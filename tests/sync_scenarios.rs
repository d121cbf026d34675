//! Integration tests for the optimistic sync layer.
//!
//! Remote calls go through [`GatedApi`], so each test decides when, and in
//! which order, responses arrive.

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{
    GatedApi, alice, gated_backend, offline_coordinator, online_coordinator, seeded_subtask_store,
    subtasks, wait_for_calls, wait_for_settled,
};
use flowtask_sync::domain::{
    SubtaskId, Task, TaskChanges, TaskDraft, TaskId, TaskStatus, ValidationError,
};
use flowtask_sync::infrastructure::{InMemoryBackend, RemoteError};
use flowtask_sync::sync::{FencingMode, SupersedeToken, SyncError};

fn ids(tasks: &[Task]) -> Vec<TaskId> {
    tasks.iter().map(|task| task.id.clone()).collect()
}

fn orders(items: &[flowtask_sync::domain::Subtask]) -> Vec<(&str, u32)> {
    items
        .iter()
        .map(|subtask| (subtask.id.as_str(), subtask.order))
        .collect()
}

// =============================================================================
// Create
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_create_while_offline_makes_no_remote_call() {
    let (_backend, api) = gated_backend();
    let coordinator = offline_coordinator(api.clone());

    let task = coordinator
        .create(TaskDraft::new("Buy milk").with_status(TaskStatus::Backlog))
        .await
        .unwrap();

    let tasks = coordinator.store().tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Buy milk");
    assert!(!tasks[0].completed);
    assert!(!task.id.as_str().is_empty());
    assert_eq!(api.calls(), 0);
}

#[rstest]
#[tokio::test]
async fn test_create_failure_is_reported_to_the_caller() {
    let (_backend, api) = gated_backend();
    let coordinator = online_coordinator(api.clone(), FencingMode::LastResponseWins);

    let create = coordinator.create(TaskDraft::new("Draft kept by caller"));
    let driver = async {
        wait_for_calls(&api, 1).await;
        api.fail(0);
    };
    let (result, ()) = tokio::join!(create, driver);

    assert!(matches!(result, Err(SyncError::Remote(RemoteError::Transport(_)))));
    assert!(coordinator.store().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_online_create_is_inserted_only_after_confirmation() {
    let (_backend, api) = gated_backend();
    let coordinator = online_coordinator(api.clone(), FencingMode::LastResponseWins);

    let create = coordinator.create(TaskDraft::new("Confirmed"));
    let driver = async {
        wait_for_calls(&api, 1).await;
        assert!(coordinator.store().is_empty());
        api.release(0);
    };
    let (result, ()) = tokio::join!(create, driver);

    let task = result.unwrap();
    assert_eq!(task.user_id, alice());
    assert_eq!(coordinator.store().get(&task.id), Some(task));
}

// =============================================================================
// Update
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_update_failure_restores_exact_previous_value() {
    let (backend, api) = gated_backend();
    let coordinator = online_coordinator(api.clone(), FencingMode::LastResponseWins);
    let seeded = coordinator.create(TaskDraft::new("Original"));
    let driver = async {
        wait_for_calls(&api, 1).await;
        api.release(0);
    };
    let (seeded, ()) = tokio::join!(seeded, driver);
    let before = seeded.unwrap();

    let update = coordinator.update(&before.id, TaskChanges::new().title("X"));
    let driver = async {
        wait_for_calls(&api, 2).await;
        assert_eq!(coordinator.store().get(&before.id).unwrap().title, "X");
        api.fail(1);
    };
    let (result, ()) = tokio::join!(update, driver);

    assert!(result.is_err());
    assert_eq!(coordinator.store().get(&before.id), Some(before.clone()));
    assert_eq!(backend.get_task(&alice(), &before.id).await.unwrap().title, "Original");
}

#[rstest]
#[case(TaskStatus::Completed, true)]
#[case(TaskStatus::InReview, false)]
#[case(TaskStatus::InProgress, false)]
#[case(TaskStatus::Backlog, false)]
#[tokio::test]
async fn test_status_change_drives_completed(#[case] status: TaskStatus, #[case] completed: bool) {
    let backend = InMemoryBackend::new();
    let coordinator = online_coordinator(
        Arc::new(backend.client(alice())),
        FencingMode::LastResponseWins,
    );
    let task = coordinator
        .create(TaskDraft::new("Coupled").with_status(TaskStatus::Completed))
        .await
        .unwrap();

    let updated = coordinator.set_status(&task.id, status).await.unwrap();
    assert_eq!(updated.completed, completed);
    assert_eq!(coordinator.store().get(&task.id).unwrap().completed, completed);
}

#[rstest]
#[tokio::test]
async fn test_conflicting_completion_is_rejected_before_any_change() {
    let backend = InMemoryBackend::new();
    let coordinator = online_coordinator(
        Arc::new(backend.client(alice())),
        FencingMode::LastResponseWins,
    );
    let task = coordinator.create(TaskDraft::new("Strict")).await.unwrap();

    let result = coordinator
        .update(
            &task.id,
            TaskChanges::new()
                .status(TaskStatus::InProgress)
                .completed(true),
        )
        .await;
    assert!(matches!(
        result,
        Err(SyncError::Validation(ValidationError::ConflictingCompletion { .. }))
    ));
    assert_eq!(coordinator.store().get(&task.id), Some(task));
}

#[rstest]
#[tokio::test]
async fn test_last_response_wins_without_fencing() {
    let (backend, api) = gated_backend();
    let coordinator = online_coordinator(api.clone(), FencingMode::LastResponseWins);
    let create = coordinator.create(TaskDraft::new("Racy"));
    let driver = async {
        wait_for_calls(&api, 1).await;
        api.release(0);
    };
    let task = tokio::join!(create, driver).0.unwrap();

    let first = coordinator.update(&task.id, TaskChanges::new().title("A"));
    let second = coordinator.update(&task.id, TaskChanges::new().title("B"));
    let driver = async {
        wait_for_calls(&api, 3).await;
        api.release(2);
        wait_for_settled(&api, 2).await;
        api.release(1);
    };
    let (first, second, ()) = tokio::join!(first, second, driver);

    assert_eq!(first.unwrap().title, "A");
    assert_eq!(second.unwrap().title, "B");
    assert_eq!(coordinator.store().get(&task.id).unwrap().title, "A");
    assert_eq!(backend.get_task(&alice(), &task.id).await.unwrap().title, "A");
}

#[rstest]
#[tokio::test]
async fn test_issue_order_fencing_drops_stale_response() {
    let (_backend, api) = gated_backend();
    let coordinator = online_coordinator(api.clone(), FencingMode::IssueOrder);
    let create = coordinator.create(TaskDraft::new("Fenced"));
    let driver = async {
        wait_for_calls(&api, 1).await;
        api.release(0);
    };
    let task = tokio::join!(create, driver).0.unwrap();

    let first = coordinator.update(&task.id, TaskChanges::new().title("A"));
    let second = coordinator.update(&task.id, TaskChanges::new().title("B"));
    let driver = async {
        wait_for_calls(&api, 3).await;
        api.release(2);
        wait_for_settled(&api, 2).await;
        api.fail(1);
    };
    let (first, second, ()) = tokio::join!(first, second, driver);

    assert_eq!(first, Err(SyncError::Superseded));
    assert_eq!(second.unwrap().title, "B");
    assert_eq!(coordinator.store().get(&task.id).unwrap().title, "B");
}

// =============================================================================
// Delete
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_delete_then_fail_restores_original_position() {
    let (_backend, api) = gated_backend();
    let coordinator = online_coordinator(api.clone(), FencingMode::LastResponseWins);
    for (call, title) in ["T1", "T2"].into_iter().enumerate() {
        let create = coordinator.create(TaskDraft::new(title));
        let driver = async {
            wait_for_calls(&api, call + 1).await;
            api.release(call);
        };
        tokio::join!(create, driver).0.unwrap();
    }
    let before = ids(&coordinator.store().tasks());

    let delete = coordinator.delete(&before[0]);
    let driver = async {
        wait_for_calls(&api, 3).await;
        assert_eq!(ids(&coordinator.store().tasks()), [before[1].clone()]);
        api.fail(2);
    };
    let (result, ()) = tokio::join!(delete, driver);

    assert!(result.is_err());
    assert_eq!(ids(&coordinator.store().tasks()), before);
}

#[rstest]
#[tokio::test]
async fn test_delete_of_foreign_task_rolls_back() {
    let backend = InMemoryBackend::new();
    let coordinator = online_coordinator(
        Arc::new(backend.client(alice())),
        FencingMode::LastResponseWins,
    );
    let task = coordinator.create(TaskDraft::new("Mine")).await.unwrap();
    backend.delete_task(&alice(), &task.id).await.unwrap();

    let result = coordinator.delete(&task.id).await;
    assert!(matches!(result, Err(SyncError::Remote(RemoteError::NotFound(_)))));
    assert_eq!(coordinator.store().get(&task.id), Some(task));
}

// =============================================================================
// Load
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_superseded_load_leaves_store_untouched() {
    let (_backend, api) = gated_backend();
    let coordinator = online_coordinator(api.clone(), FencingMode::LastResponseWins);
    let token = SupersedeToken::new();

    let load = coordinator.load_all(&token);
    let driver = async {
        wait_for_calls(&api, 1).await;
        token.supersede();
        api.release(0);
    };
    let (result, ()) = tokio::join!(load, driver);

    assert_eq!(result, Err(SyncError::Superseded));
    assert!(coordinator.store().is_empty());
}

// =============================================================================
// Subtasks
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_subtask_add_failure_restores_original_list() {
    let (backend, api) = gated_backend();
    let original = subtasks("1", &["1-1"]);
    let store = seeded_subtask_store(
        &backend,
        api.clone(),
        FencingMode::LastResponseWins,
        "1",
        original.clone(),
    )
    .await;
    let task_id = TaskId::new("1");

    let add = store.add(&task_id, "Review");
    let driver = async {
        wait_for_calls(&api, 1).await;
        let optimistic = store.subtasks(&task_id);
        assert_eq!(optimistic.len(), 2);
        assert!(optimistic[1].id.is_provisional());
        assert_eq!(optimistic[1].order, 1);
        api.fail(0);
    };
    let (result, ()) = tokio::join!(add, driver);

    assert!(result.is_err());
    assert_eq!(*store.subtasks(&task_id), original);
}

#[rstest]
#[tokio::test]
async fn test_subtask_reorder_assigns_target_positions() {
    let (backend, api) = gated_backend();
    let store = seeded_subtask_store(
        &backend,
        api.clone(),
        FencingMode::LastResponseWins,
        "1",
        subtasks("1", &["a", "b", "c"]),
    )
    .await;
    let task_id = TaskId::new("1");
    let target = [SubtaskId::new("c"), SubtaskId::new("a"), SubtaskId::new("b")];

    let reorder = store.reorder(&task_id, &target);
    let driver = async {
        wait_for_calls(&api, 1).await;
        assert_eq!(
            orders(&store.subtasks(&task_id)),
            [("c", 0), ("a", 1), ("b", 2)]
        );
        api.release(0);
    };
    let (result, ()) = tokio::join!(reorder, driver);

    assert_eq!(orders(&result.unwrap()), [("c", 0), ("a", 1), ("b", 2)]);
    assert_eq!(
        orders(&backend.list_subtasks(&task_id).await),
        [("c", 0), ("a", 1), ("b", 2)]
    );
}

#[rstest]
#[tokio::test]
async fn test_subtask_reorder_failure_restores_snapshot() {
    let (backend, api) = gated_backend();
    let original = subtasks("1", &["a", "b", "c"]);
    let store = seeded_subtask_store(
        &backend,
        api.clone(),
        FencingMode::LastResponseWins,
        "1",
        original.clone(),
    )
    .await;
    let task_id = TaskId::new("1");

    let new_order = [SubtaskId::new("b")];
    let reorder = store.reorder(&task_id, &new_order);
    let driver = async {
        wait_for_calls(&api, 1).await;
        api.fail(0);
    };
    let (result, ()) = tokio::join!(reorder, driver);

    assert!(result.is_err());
    assert_eq!(*store.subtasks(&task_id), original);
}

#[rstest]
#[tokio::test]
async fn test_fetch_failure_clears_loading_flag() {
    let (_backend, api) = gated_backend();
    let store = flowtask_sync::sync::LocalSubtaskStore::new(
        api.clone(),
        flowtask_sync::sync::Fence::default(),
    );
    let task_id = TaskId::new("1");

    let fetch = store.fetch(&task_id, false);
    let driver = async {
        wait_for_calls(&api, 1).await;
        assert!(store.is_loading(&task_id));
        api.fail(0);
    };
    let (result, ()) = tokio::join!(fetch, driver);

    assert!(result.is_err());
    assert!(!store.is_loading(&task_id));
    assert!(!store.is_loaded(&task_id));
}

#[rstest]
#[tokio::test]
async fn test_superseded_fetch_does_not_write() {
    let (backend, api) = gated_backend();
    backend
        .seed_subtasks(TaskId::new("1"), subtasks("1", &["1-1", "1-2"]))
        .await;
    let store = flowtask_sync::sync::LocalSubtaskStore::new(
        api.clone(),
        flowtask_sync::sync::Fence::default(),
    );
    let task_id = TaskId::new("1");
    let token = SupersedeToken::new();

    let fetch = store.fetch_guarded(&task_id, false, &token);
    let driver = async {
        wait_for_calls(&api, 1).await;
        token.supersede();
        api.release(0);
    };
    let (result, ()) = tokio::join!(fetch, driver);

    assert_eq!(result, Err(SyncError::Superseded));
    assert!(store.subtasks(&task_id).is_empty());
    assert!(!store.is_loading(&task_id));
}

#[rstest]
#[tokio::test]
async fn test_concurrent_adds_are_not_superseded_by_each_other() {
    let (backend, api) = gated_backend();
    let store = seeded_subtask_store(
        &backend,
        api.clone(),
        FencingMode::IssueOrder,
        "1",
        Vec::new(),
    )
    .await;
    let task_id = TaskId::new("1");

    let first = store.add(&task_id, "First");
    let second = store.add(&task_id, "Second");
    let driver = async {
        wait_for_calls(&api, 2).await;
        api.release(0);
        api.release(1);
    };
    let (first, second, ()) = tokio::join!(first, second, driver);

    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_some());
    let stored = store.subtasks(&task_id);
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|subtask| !subtask.id.is_provisional()));
}

#[rstest]
fn test_gated_api_counts_nothing_before_use() {
    let api = GatedApi::new(InMemoryBackend::new().client(alice()));
    assert_eq!(api.calls(), 0);
    assert_eq!(api.settled(), 0);
}
