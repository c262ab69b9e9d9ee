//! Test-only store wrapper that injects failures into a real backend.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Database, LibSqlBackend};
use crate::error::DatabaseError;
use crate::model::{Capability, Task, TaskKind, TaskStatus, Worker};

/// In-memory libSQL store whose `record_assignment` and `assign_task_if`
/// can be made to fail on demand.
pub(crate) struct FaultyStore {
    inner: LibSqlBackend,
    record_calls: AtomicUsize,
    /// 1-based `record_assignment` call to fail; 0 never fails.
    fail_record_call: AtomicUsize,
    fail_assign_of: Mutex<Option<Uuid>>,
}

impl FaultyStore {
    pub(crate) async fn new() -> Self {
        Self {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            record_calls: AtomicUsize::new(0),
            fail_record_call: AtomicUsize::new(0),
            fail_assign_of: Mutex::new(None),
        }
    }

    /// Fail the `n`th `record_assignment` from now on.
    pub(crate) fn fail_nth_record(&self, n: usize) {
        self.record_calls.store(0, Ordering::SeqCst);
        self.fail_record_call.store(n, Ordering::SeqCst);
    }

    pub(crate) fn fail_assign_of(&self, task_id: Uuid) {
        *self.fail_assign_of.lock().unwrap() = Some(task_id);
    }

    fn injected() -> DatabaseError {
        DatabaseError::Query("injected".into())
    }
}

#[async_trait]
impl Database for FaultyStore {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.inner.run_migrations().await
    }

    async fn insert_worker(&self, worker: &Worker) -> Result<(), DatabaseError> {
        self.inner.insert_worker(worker).await
    }

    async fn get_worker(&self, id: Uuid) -> Result<Option<Worker>, DatabaseError> {
        self.inner.get_worker(id).await
    }

    async fn list_available_workers(&self) -> Result<Vec<Worker>, DatabaseError> {
        self.inner.list_available_workers().await
    }

    async fn set_availability_if_unlocked(
        &self,
        id: Uuid,
        available: bool,
    ) -> Result<bool, DatabaseError> {
        self.inner.set_availability_if_unlocked(id, available).await
    }

    async fn set_availability_by_admin(
        &self,
        id: Uuid,
        available: bool,
        locked: bool,
    ) -> Result<bool, DatabaseError> {
        self.inner.set_availability_by_admin(id, available, locked).await
    }

    async fn set_capabilities(
        &self,
        id: Uuid,
        capabilities: &[Capability],
    ) -> Result<bool, DatabaseError> {
        self.inner.set_capabilities(id, capabilities).await
    }

    async fn set_standing(
        &self,
        id: Uuid,
        is_active: bool,
        is_banned: bool,
    ) -> Result<bool, DatabaseError> {
        self.inner.set_standing(id, is_active, is_banned).await
    }

    async fn record_assignment(
        &self,
        id: Uuid,
        kind: TaskKind,
        value: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let call = self.record_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_record_call.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.record_assignment(id, kind, value, now).await
    }

    async fn insert_task(&self, task: &Task) -> Result<(), DatabaseError> {
        self.inner.insert_task(task).await
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        self.inner.get_task(id).await
    }

    async fn list_tasks_for_assignee(
        &self,
        worker_id: Uuid,
        kind: TaskKind,
        statuses: &[TaskStatus],
    ) -> Result<Vec<Task>, DatabaseError> {
        self.inner.list_tasks_for_assignee(worker_id, kind, statuses).await
    }

    async fn list_unassigned_tasks(&self, limit: usize) -> Result<Vec<Task>, DatabaseError> {
        self.inner.list_unassigned_tasks(limit).await
    }

    async fn assign_task_if(
        &self,
        id: Uuid,
        expected: Option<Uuid>,
        new_assignee: Uuid,
        statuses: &[TaskStatus],
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let fail = *self.fail_assign_of.lock().unwrap() == Some(id);
        if fail {
            return Err(Self::injected());
        }
        self.inner
            .assign_task_if(id, expected, new_assignee, statuses, now)
            .await
    }

    async fn try_lock_task(
        &self,
        id: Uuid,
        worker_id: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        self.inner.try_lock_task(id, worker_id, now, expires_at).await
    }

    async fn release_task_lock(
        &self,
        id: Uuid,
        worker_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        self.inner.release_task_lock(id, worker_id, now).await
    }

    async fn finish_locked_task(
        &self,
        id: Uuid,
        worker_id: Uuid,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        self.inner.finish_locked_task(id, worker_id, status, now).await
    }

    async fn transition_ticket(
        &self,
        id: Uuid,
        worker_id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        self.inner.transition_ticket(id, worker_id, from, to, now).await
    }

    async fn count_stale_locks(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        self.inner.count_stale_locks(now).await
    }
}
