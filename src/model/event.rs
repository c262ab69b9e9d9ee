//! Desk events broadcast to operator dashboards.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{TaskKind, TaskLock};

/// Messages sent to subscribers whenever the desk changes a task or worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeskEvent {
    /// A new task was handed to a worker.
    TaskAssigned {
        task_id: Uuid,
        kind: TaskKind,
        worker_id: Uuid,
    },
    /// A task moved from an offline worker to another.
    TaskReassigned {
        task_id: Uuid,
        kind: TaskKind,
        from: Uuid,
        to: Uuid,
    },
    /// A task could not be handed off and stays with an offline worker.
    ReassignmentGap { task_id: Uuid, worker_id: Uuid },
    LockAcquired { task_id: Uuid, lock: TaskLock },
    LockReleased { task_id: Uuid, worker_id: Uuid },
    TaskCompleted { task_id: Uuid, worker_id: Uuid },
    TaskRejected { task_id: Uuid, worker_id: Uuid },
    WorkerAvailabilityChanged { worker_id: Uuid, available: bool },
}
