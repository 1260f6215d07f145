//! Integration tests for the queue manager.
//!
//! The repository tests cover the SQL-level invariants; these cover the
//! manager contract: validation before writes, typed duplicate rejection,
//! ownership-checked cancellation, and event emission.

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use capgen_core::settings::CaptionSettings;
use capgen_db::models::status::TaskStatus;
use capgen_events::{EventBus, TASK_COMPLETED, TASK_CREATED, TASK_STARTED};
use capgen_queue::{QueueConfig, QueueError, TaskQueue};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn queue_with_bound(pool: &PgPool, max_concurrent: i64) -> TaskQueue {
    TaskQueue::new(
        pool.clone(),
        QueueConfig { max_concurrent },
        Arc::new(EventBus::default()),
    )
}

fn queue(pool: &PgPool) -> TaskQueue {
    queue_with_bound(pool, 10)
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn malformed_settings_rejected_before_any_write(pool: PgPool) {
    let queue = queue(&pool);
    let settings = CaptionSettings {
        max_length: 0,
        ..Default::default()
    };

    let err = queue.enqueue(1, 10, &settings).await.unwrap_err();
    assert_matches!(err, QueueError::Validation(_));

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.total, 0, "rejected submission must not persist");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_submission_rejected_with_typed_error(pool: PgPool) {
    let queue = queue(&pool);
    let settings = CaptionSettings::default();

    queue.enqueue(1, 10, &settings).await.unwrap();
    let err = queue.enqueue(1, 10, &settings).await.unwrap_err();
    assert_matches!(err, QueueError::DuplicateActiveTask { owner_id: 1 });
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn owner_can_resubmit_after_terminal(pool: PgPool) {
    let queue = queue(&pool);
    let settings = CaptionSettings::default();

    let task = queue.enqueue(1, 10, &settings).await.unwrap();
    queue.claim_next("w1").await.unwrap().unwrap();
    assert!(queue.complete(task.id, json!({})).await.unwrap());

    let again = queue.enqueue(1, 10, &settings).await.unwrap();
    assert_eq!(again.status(), Some(TaskStatus::Queued));
}

// ---------------------------------------------------------------------------
// Three owners, capacity two
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn capacity_two_scenario(pool: PgPool) {
    let queue = queue_with_bound(&pool, 2);
    let settings = CaptionSettings::default();

    let a = queue.enqueue(1, 10, &settings).await.unwrap();
    let b = queue.enqueue(2, 20, &settings).await.unwrap();
    let c = queue.enqueue(3, 30, &settings).await.unwrap();

    assert_eq!(queue.claim_next("w1").await.unwrap().unwrap().id, a.id);
    assert_eq!(queue.claim_next("w2").await.unwrap().unwrap().id, b.id);
    assert!(queue.claim_next("w3").await.unwrap().is_none());

    assert!(queue.complete(a.id, json!({})).await.unwrap());
    assert_eq!(queue.claim_next("w3").await.unwrap().unwrap().id, c.id);
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_is_running_only_and_idempotent(pool: PgPool) {
    let queue = queue(&pool);
    let task = queue.enqueue(1, 10, &CaptionSettings::default()).await.unwrap();

    // Queued task cannot complete.
    assert!(!queue.complete(task.id, json!({})).await.unwrap());

    queue.claim_next("w1").await.unwrap().unwrap();
    assert!(queue.complete(task.id, json!({"caption": "hi"})).await.unwrap());

    // Second completion is a no-op, as is a late failure report.
    assert!(!queue.complete(task.id, json!({"caption": "bye"})).await.unwrap());
    assert!(!queue.fail(task.id, "too late").await.unwrap());

    assert_eq!(
        queue.status_of(task.id).await.unwrap(),
        Some(TaskStatus::Completed)
    );
}

// ---------------------------------------------------------------------------
// Cancellation and ownership
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn owner_can_cancel_own_task(pool: PgPool) {
    let queue = queue(&pool);
    let task = queue.enqueue(1, 10, &CaptionSettings::default()).await.unwrap();

    assert!(queue.cancel(task.id, 1, false).await.unwrap());
    assert_eq!(
        queue.status_of(task.id).await.unwrap(),
        Some(TaskStatus::Cancelled)
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn other_user_cannot_cancel(pool: PgPool) {
    let queue = queue(&pool);
    let task = queue.enqueue(1, 10, &CaptionSettings::default()).await.unwrap();

    assert!(!queue.cancel(task.id, 2, false).await.unwrap());
    assert_eq!(
        queue.status_of(task.id).await.unwrap(),
        Some(TaskStatus::Queued),
        "denied cancel must not change state",
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_can_cancel_any_task(pool: PgPool) {
    let queue = queue(&pool);
    let task = queue.enqueue(1, 10, &CaptionSettings::default()).await.unwrap();

    assert!(queue.cancel(task.id, 99, true).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_on_terminal_task_is_a_false_no_op(pool: PgPool) {
    let queue = queue(&pool);
    let task = queue.enqueue(1, 10, &CaptionSettings::default()).await.unwrap();
    queue.claim_next("w1").await.unwrap().unwrap();
    queue.complete(task.id, json!({})).await.unwrap();

    assert!(!queue.cancel(task.id, 1, false).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_unknown_task_is_not_found(pool: PgPool) {
    let queue = queue(&pool);
    let err = queue.cancel(Uuid::now_v7(), 1, false).await.unwrap_err();
    assert_matches!(err, QueueError::NotFound(_));
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn status_of_unknown_task_is_none(pool: PgPool) {
    let queue = queue(&pool);
    assert!(queue.status_of(Uuid::now_v7()).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn active_task_and_history_reflect_lifecycle(pool: PgPool) {
    let queue = queue(&pool);
    let settings = CaptionSettings::default();

    let first = queue.enqueue(1, 10, &settings).await.unwrap();
    queue.claim_next("w1").await.unwrap().unwrap();
    queue.complete(first.id, json!({})).await.unwrap();

    let second = queue.enqueue(1, 10, &settings).await.unwrap();

    let active = queue.active_task_for(1).await.unwrap().unwrap();
    assert_eq!(active.id, second.id);

    let history = queue.history(1, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id, "newest first");
    assert_eq!(history[1].id, first.id);
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn lifecycle_events_are_published(pool: PgPool) {
    let events = Arc::new(EventBus::default());
    let queue = TaskQueue::new(
        pool.clone(),
        QueueConfig { max_concurrent: 10 },
        Arc::clone(&events),
    );
    let mut rx = events.subscribe();

    let task = queue.enqueue(1, 10, &CaptionSettings::default()).await.unwrap();
    queue.claim_next("w1").await.unwrap().unwrap();
    queue.complete(task.id, json!({"caption": "hi"})).await.unwrap();

    let created = rx.recv().await.unwrap();
    assert_eq!(created.event_type, TASK_CREATED);
    assert_eq!(created.task_id, task.id);
    assert_eq!(created.owner_id, 1);

    let started = rx.recv().await.unwrap();
    assert_eq!(started.event_type, TASK_STARTED);

    let completed = rx.recv().await.unwrap();
    assert_eq!(completed.event_type, TASK_COMPLETED);
}
