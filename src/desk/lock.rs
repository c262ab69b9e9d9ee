//! Lock manager — time-bounded mutual exclusion on withdrawals.
//!
//! Acquisition is one conditional `UPDATE` in the store; this module only
//! decides the expiry and, on denial, reads the row back to explain why.
//! Expired locks are never swept: the next acquire simply overwrites them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::TaskError;
use crate::model::{Task, TaskKind, TaskStatus, lock_duration, lock_instant};
use crate::store::Database;

pub struct LockManager {
    db: Arc<dyn Database>,
}

impl LockManager {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Claim `task_id` for `worker_id` for the next five minutes.
    ///
    /// Re-acquiring a lock you already hold refreshes its expiry.
    pub async fn acquire(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, TaskError> {
        self.acquire_at(task_id, worker_id, Utc::now()).await
    }

    pub async fn acquire_at(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        let now = lock_instant(now);
        let expires_at = now + lock_duration();

        if self.db.try_lock_task(task_id, worker_id, now, expires_at).await? {
            let task = self.load(task_id).await?;
            info!(task_id = %task_id, worker_id = %worker_id, %expires_at, "Lock acquired");
            return Ok(task);
        }

        let task = self.load(task_id).await?;
        if task.kind != TaskKind::Withdrawal {
            return Err(TaskError::InvalidTransition {
                id: task_id,
                action: "lock",
                reason: "only withdrawals are locked".into(),
            });
        }
        if task.status.is_terminal() {
            return Err(TaskError::AlreadyTerminal {
                id: task_id,
                status: task.status,
            });
        }
        if let Some(lock) = task.active_lock(now) {
            info!(
                task_id = %task_id,
                worker_id = %worker_id,
                holder = %lock.holder,
                "Lock denied, held by another worker"
            );
            return Err(TaskError::LockConflict {
                id: task_id,
                holder: lock.holder,
                expires_at: lock.expires_at,
            });
        }

        // The row moved between our update and the read-back.
        warn!(task_id = %task_id, worker_id = %worker_id, status = %task.status, "Lock raced");
        Err(TaskError::InvalidTransition {
            id: task_id,
            action: "lock",
            reason: "task changed while acquiring".into(),
        })
    }

    /// Give the lock back without finishing; the task returns to pending
    /// and stays with its assignee.
    pub async fn release(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, TaskError> {
        if self.db.release_task_lock(task_id, worker_id, Utc::now()).await? {
            info!(task_id = %task_id, worker_id = %worker_id, "Lock released");
            return self.load(task_id).await;
        }
        Err(self
            .not_holder(task_id, worker_id, TaskStatus::Pending, "release")
            .await)
    }

    /// Finish a withdrawal the caller holds the lock on.
    pub async fn complete(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, TaskError> {
        self.finish(task_id, worker_id, TaskStatus::Completed, "complete").await
    }

    /// Decline a withdrawal the caller holds the lock on.
    pub async fn reject(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, TaskError> {
        self.finish(task_id, worker_id, TaskStatus::Rejected, "reject").await
    }

    async fn finish(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        status: TaskStatus,
        action: &'static str,
    ) -> Result<Task, TaskError> {
        if self
            .db
            .finish_locked_task(task_id, worker_id, status, Utc::now())
            .await?
        {
            info!(task_id = %task_id, worker_id = %worker_id, %status, "Withdrawal finished");
            return self.load(task_id).await;
        }
        Err(self.not_holder(task_id, worker_id, status, action).await)
    }

    /// Explain why a holder-only operation was refused.
    async fn not_holder(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        target: TaskStatus,
        action: &'static str,
    ) -> TaskError {
        let task = match self.load(task_id).await {
            Ok(task) => task,
            Err(e) => return e,
        };
        if task.status.is_terminal() {
            return TaskError::AlreadyTerminal {
                id: task_id,
                status: task.status,
            };
        }
        let reason = match &task.lock {
            Some(lock) if lock.holder != worker_id => format!("lock is held by {}", lock.holder),
            _ if !task.status.can_transition_to(target) => {
                format!("task is {}, not {}", task.status, TaskStatus::InProgress)
            }
            _ => "caller does not hold the lock".to_string(),
        };
        warn!(task_id = %task_id, worker_id = %worker_id, action, %reason, "Lock operation refused");
        TaskError::InvalidTransition {
            id: task_id,
            action,
            reason,
        }
    }

    async fn load(&self, task_id: Uuid) -> Result<Task, TaskError> {
        self.db
            .get_task(task_id)
            .await?
            .ok_or(TaskError::TaskNotFound { id: task_id })
    }
}
