//! Duplicate guard — catches double-processing before a lock is attempted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::TaskError;
use crate::model::{TaskStatus, lock_instant};
use crate::store::Database;

/// Why a processing attempt would be a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DuplicateReason {
    AlreadyCompleted,
    AlreadyRejected,
    BeingProcessed {
        holder: Uuid,
        expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    #[serde(flatten)]
    pub reason: Option<DuplicateReason>,
    /// Who finished the task, or who is holding it right now.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<Uuid>,
}

impl DuplicateCheck {
    fn clear() -> Self {
        Self {
            is_duplicate: false,
            reason: None,
            processed_by: None,
        }
    }

    fn duplicate(reason: DuplicateReason, processed_by: Option<Uuid>) -> Self {
        Self {
            is_duplicate: true,
            reason: Some(reason),
            processed_by,
        }
    }
}

pub struct DuplicateGuard {
    db: Arc<dyn Database>,
}

impl DuplicateGuard {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Whether anyone starting work on `task_id` now would be duplicating effort.
    pub async fn check_duplicate(&self, task_id: Uuid) -> Result<DuplicateCheck, TaskError> {
        self.check(task_id, None, Utc::now()).await
    }

    /// Same as [`check_duplicate`](Self::check_duplicate), but a live lock
    /// held by `worker_id` itself is not reported.
    pub async fn check_duplicate_for(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
    ) -> Result<DuplicateCheck, TaskError> {
        self.check(task_id, Some(worker_id), Utc::now()).await
    }

    pub(crate) async fn check(
        &self,
        task_id: Uuid,
        asker: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<DuplicateCheck, TaskError> {
        let now = lock_instant(now);
        let task = self
            .db
            .get_task(task_id)
            .await?
            .ok_or(TaskError::TaskNotFound { id: task_id })?;

        let check = match task.status {
            TaskStatus::Completed => {
                DuplicateCheck::duplicate(DuplicateReason::AlreadyCompleted, task.processed_by)
            }
            TaskStatus::Rejected => {
                DuplicateCheck::duplicate(DuplicateReason::AlreadyRejected, task.processed_by)
            }
            _ => match task.active_lock(now) {
                Some(lock) if Some(lock.holder) != asker => DuplicateCheck::duplicate(
                    DuplicateReason::BeingProcessed {
                        holder: lock.holder,
                        expires_at: lock.expires_at,
                    },
                    Some(lock.holder),
                ),
                _ => DuplicateCheck::clear(),
            },
        };

        Ok(check)
    }
}
