//! Unified `Database` trait — single async interface for worker and task records.
//!
//! Every mutation that two operators could race on is expressed as a
//! conditional update returning whether the row changed, so callers never
//! read-then-write shared state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{Capability, Task, TaskKind, TaskStatus, Worker};

/// Backend-agnostic store for the desk.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Workers ─────────────────────────────────────────────────────

    /// Insert a new worker.
    async fn insert_worker(&self, worker: &Worker) -> Result<(), DatabaseError>;

    /// Get a worker by ID.
    async fn get_worker(&self, id: Uuid) -> Result<Option<Worker>, DatabaseError>;

    /// Workers that are active, not banned, and flagged available.
    /// Capability filtering is left to the caller.
    async fn list_available_workers(&self) -> Result<Vec<Worker>, DatabaseError>;

    /// Worker-initiated availability toggle. Returns `false` without
    /// touching the row when the worker is admin-locked or missing.
    async fn set_availability_if_unlocked(
        &self,
        id: Uuid,
        available: bool,
    ) -> Result<bool, DatabaseError>;

    /// Administrator override: sets availability and the admin lock flag.
    /// Returns `false` if the worker does not exist.
    async fn set_availability_by_admin(
        &self,
        id: Uuid,
        available: bool,
        locked: bool,
    ) -> Result<bool, DatabaseError>;

    /// Replace a worker's capability set. Returns `false` if missing.
    async fn set_capabilities(
        &self,
        id: Uuid,
        capabilities: &[Capability],
    ) -> Result<bool, DatabaseError>;

    /// Update account standing. Returns `false` if missing.
    async fn set_standing(
        &self,
        id: Uuid,
        is_active: bool,
        is_banned: bool,
    ) -> Result<bool, DatabaseError>;

    /// Bump the worker's counter for `kind`, add `value` to the withdrawal
    /// total, and stamp `last_assigned_at`.
    async fn record_assignment(
        &self,
        id: Uuid,
        kind: TaskKind,
        value: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    // ── Tasks ───────────────────────────────────────────────────────

    /// Insert a new task.
    async fn insert_task(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Get a task by ID.
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError>;

    /// Tasks of `kind` assigned to `worker_id` whose status is one of
    /// `statuses`, oldest first.
    async fn list_tasks_for_assignee(
        &self,
        worker_id: Uuid,
        kind: TaskKind,
        statuses: &[TaskStatus],
    ) -> Result<Vec<Task>, DatabaseError>;

    /// Pending tasks with no assignee, oldest first.
    async fn list_unassigned_tasks(&self, limit: usize) -> Result<Vec<Task>, DatabaseError>;

    /// Point a task at `new_assignee`, but only if it is still assigned to
    /// `expected` (or unassigned when `expected` is `None`), is unlocked,
    /// and its status is one of `statuses`.
    async fn assign_task_if(
        &self,
        id: Uuid,
        expected: Option<Uuid>,
        new_assignee: Uuid,
        statuses: &[TaskStatus],
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Single compare-and-set lock acquisition on a withdrawal.
    ///
    /// Succeeds when the task is pending or in progress and either has no
    /// holder, is held by `worker_id`, or holds a lock that expired before
    /// `now`. On success the task is in progress with a fresh expiry.
    async fn try_lock_task(
        &self,
        id: Uuid,
        worker_id: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Clear the lock if `worker_id` holds it; the task returns to pending.
    async fn release_task_lock(
        &self,
        id: Uuid,
        worker_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Move an in-progress withdrawal locked by `worker_id` to a terminal
    /// status, recording `worker_id` as `processed_by`.
    async fn finish_locked_task(
        &self,
        id: Uuid,
        worker_id: Uuid,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Move a ticket assigned to `worker_id` from one of `from` to `to`.
    async fn transition_ticket(
        &self,
        id: Uuid,
        worker_id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Number of in-progress withdrawals whose lock expired before `now`.
    async fn count_stale_locks(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError>;
}
