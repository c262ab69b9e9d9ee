//! End-to-end desk scenarios against an on-disk libSQL database.
//!
//! Each test opens a fresh database in a temp directory and drives the
//! public `TaskDesk` API the way request handlers would.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use tempfile::TempDir;
use tokio::time::timeout;

use staff_desk::desk::{GapReason, TaskDesk};
use staff_desk::error::TaskError;
use staff_desk::model::{DeskEvent, Task, TaskStatus, Worker, WorkerRole};
use staff_desk::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn open_desk() -> (TempDir, TaskDesk) {
    let dir = TempDir::new().unwrap();
    let db = LibSqlBackend::new_local(&dir.path().join("desk.db"))
        .await
        .unwrap();
    (dir, TaskDesk::new(Arc::new(db)))
}

async fn on_shift(desk: &TaskDesk, name: &str, role: WorkerRole) -> Worker {
    let w = Worker::new(name, role).with_availability(true);
    desk.registry().register(&w).await.unwrap();
    w
}

#[tokio::test]
async fn three_withdrawals_go_one_per_worker() {
    timeout(TEST_TIMEOUT, async {
        let (_dir, desk) = open_desk().await;
        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            ids.push(on_shift(&desk, name, WorkerRole::Moderator).await.id);
        }

        let mut owners = Vec::new();
        for i in 0..3 {
            let task = desk
                .submit_task(Task::withdrawal(format!("payout {i}"), dec!(25)))
                .await
                .unwrap();
            owners.push(task.assigned_to.unwrap());
        }

        owners.sort();
        ids.sort();
        assert_eq!(owners, ids);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn lock_is_denied_then_taken_over_after_expiry() {
    timeout(TEST_TIMEOUT, async {
        let (_dir, desk) = open_desk().await;
        let a = on_shift(&desk, "a", WorkerRole::Moderator).await;
        let b = on_shift(&desk, "b", WorkerRole::Moderator).await;
        let task = desk
            .submit_task(Task::withdrawal("payout", dec!(500)))
            .await
            .unwrap();

        let t0 = Utc::now();
        desk.locks().acquire_at(task.id, a.id, t0).await.unwrap();

        let err = desk
            .locks()
            .acquire_at(task.id, b.id, t0 + ChronoDuration::seconds(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains(&a.id.to_string()));
        assert!(matches!(err, TaskError::LockConflict { holder, .. } if holder == a.id));

        let taken = desk
            .locks()
            .acquire_at(task.id, b.id, t0 + ChronoDuration::seconds(301))
            .await
            .unwrap();
        assert_eq!(taken.lock.unwrap().holder, b.id);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn release_returns_task_to_pending_for_anyone() {
    timeout(TEST_TIMEOUT, async {
        let (_dir, desk) = open_desk().await;
        let a = on_shift(&desk, "a", WorkerRole::Moderator).await;
        let task = desk
            .submit_task(Task::withdrawal("payout", dec!(80)))
            .await
            .unwrap();
        assert_eq!(task.assigned_to, Some(a.id));
        let b = on_shift(&desk, "b", WorkerRole::Moderator).await;

        desk.begin_processing(task.id, a.id).await.unwrap();
        let released = desk.release(task.id, a.id).await.unwrap();
        assert_eq!(released.status, TaskStatus::Pending);
        assert_eq!(released.assigned_to, Some(a.id));

        let granted = desk.begin_processing(task.id, b.id).await.unwrap();
        assert_eq!(granted.lock.unwrap().holder, b.id);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn offline_worker_tickets_split_between_idle_colleagues() {
    timeout(TEST_TIMEOUT, async {
        let (_dir, desk) = open_desk().await;
        let a = on_shift(&desk, "a", WorkerRole::Support).await;
        let t1 = desk.submit_task(Task::ticket("login")).await.unwrap();
        let t2 = desk.submit_task(Task::ticket("refund")).await.unwrap();
        assert_eq!(t1.assigned_to, Some(a.id));
        assert_eq!(t2.assigned_to, Some(a.id));

        let b = on_shift(&desk, "b", WorkerRole::Support).await;
        let c = on_shift(&desk, "c", WorkerRole::Support).await;

        let report = desk.go_offline(a.id).await.unwrap();
        assert_eq!(report.tickets_reassigned, 2);
        assert!(report.is_complete());

        let mut owners = Vec::new();
        for id in [t1.id, t2.id] {
            owners.push(desk.store().get_task(id).await.unwrap().unwrap().assigned_to.unwrap());
        }
        owners.sort();
        let mut expected = vec![b.id, c.id];
        expected.sort();
        assert_eq!(owners, expected);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn sole_withdrawal_worker_going_offline_leaves_gap() {
    timeout(TEST_TIMEOUT, async {
        let (_dir, desk) = open_desk().await;
        let a = on_shift(&desk, "a", WorkerRole::Moderator).await;
        let task = desk
            .submit_task(Task::withdrawal("payout", dec!(60)))
            .await
            .unwrap();

        let mut rx = desk.subscribe();
        let report = desk.go_offline(a.id).await.unwrap();

        assert_eq!(report.withdrawals_reassigned, 0);
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].task_id, task.id);
        assert_eq!(report.gaps[0].reason, GapReason::NoEligibleWorker);

        let still = desk.store().get_task(task.id).await.unwrap().unwrap();
        assert_eq!(still.assigned_to, Some(a.id));
        assert_eq!(still.status, TaskStatus::Pending);

        let mut saw_gap = false;
        while let Ok(event) = rx.try_recv() {
            if let DeskEvent::ReassignmentGap { task_id, worker_id } = event {
                assert_eq!(task_id, task.id);
                assert_eq!(worker_id, a.id);
                saw_gap = true;
            }
        }
        assert!(saw_gap);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn completed_withdrawal_is_reported_as_duplicate() {
    timeout(TEST_TIMEOUT, async {
        let (_dir, desk) = open_desk().await;
        let a = on_shift(&desk, "a", WorkerRole::Admin).await;
        let b = on_shift(&desk, "b", WorkerRole::Admin).await;
        let task = desk
            .submit_task(Task::withdrawal("payout", dec!(15)))
            .await
            .unwrap();

        desk.begin_processing(task.id, a.id).await.unwrap();
        let check = desk.guard().check_duplicate_for(task.id, b.id).await.unwrap();
        assert!(check.is_duplicate);
        assert_eq!(check.processed_by, Some(a.id));

        desk.complete(task.id, a.id).await.unwrap();
        let check = desk.guard().check_duplicate(task.id).await.unwrap();
        assert!(check.is_duplicate);
        assert_eq!(check.processed_by, Some(a.id));

        assert!(matches!(
            desk.begin_processing(task.id, b.id).await.unwrap_err(),
            TaskError::AlreadyTerminal { status: TaskStatus::Completed, .. }
        ));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn state_survives_reopening_the_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("desk.db");

    let (worker_id, task_id) = {
        let desk = TaskDesk::new(Arc::new(LibSqlBackend::new_local(&path).await.unwrap()));
        let w = on_shift(&desk, "a", WorkerRole::Moderator).await;
        let task = desk
            .submit_task(Task::withdrawal("payout", dec!(42.50)))
            .await
            .unwrap();
        (w.id, task.id)
    };

    let db = LibSqlBackend::new_local(&path).await.unwrap();
    let task = db.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.assigned_to, Some(worker_id));
    assert_eq!(task.amount, dec!(42.50));

    let stats = db.get_worker(worker_id).await.unwrap().unwrap().task_stats;
    assert_eq!(stats.withdrawals_handled, 1);
    assert_eq!(stats.withdrawals_value, dec!(42.50));
}
