//! Desk — assignment and locking of operator work.
//!
//! Core components:
//! - `registry` — worker eligibility and availability toggles
//! - `load` — append-only per-worker assignment counters
//! - `assigner` — greedy least-loaded worker selection
//! - `lock` — five-minute processing locks on withdrawals
//! - `reassign` — moves an offline worker's backlog to colleagues
//! - `guard` — duplicate-processing check ahead of a lock attempt
//! - `sweep` — periodic retry for tasks nobody could take
//!
//! [`TaskDesk`] wires them together over one store and broadcasts a
//! [`DeskEvent`] for every change it makes.

pub mod assigner;
pub mod guard;
pub mod load;
pub mod lock;
pub mod reassign;
pub mod registry;
pub mod sweep;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

pub use assigner::TaskAssigner;
pub use guard::{DuplicateCheck, DuplicateGuard, DuplicateReason};
pub use load::LoadTracker;
pub use lock::LockManager;
pub use reassign::{GapReason, ReassignmentCoordinator, ReassignmentGap, ReassignmentReport};
pub use registry::WorkerRegistry;
pub use sweep::spawn_assignment_sweep;

use crate::error::TaskError;
use crate::model::{DeskEvent, Task, TaskKind, TaskStatus};
use crate::store::Database;

/// Default broadcast channel capacity.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Entry point for request handlers.
pub struct TaskDesk {
    db: Arc<dyn Database>,
    registry: Arc<WorkerRegistry>,
    load: Arc<LoadTracker>,
    assigner: Arc<TaskAssigner>,
    locks: LockManager,
    reassigner: ReassignmentCoordinator,
    guard: DuplicateGuard,
    events: broadcast::Sender<DeskEvent>,
}

impl TaskDesk {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self::with_event_capacity(db, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(db: Arc<dyn Database>, capacity: usize) -> Self {
        let (events, _rx) = broadcast::channel(capacity.max(1));
        let registry = Arc::new(WorkerRegistry::new(Arc::clone(&db)));
        let load = Arc::new(LoadTracker::new(Arc::clone(&db)));
        let assigner = Arc::new(TaskAssigner::new(Arc::clone(&registry)));

        Self {
            locks: LockManager::new(Arc::clone(&db)),
            reassigner: ReassignmentCoordinator::new(
                Arc::clone(&db),
                Arc::clone(&assigner),
                Arc::clone(&load),
            ),
            guard: DuplicateGuard::new(Arc::clone(&db)),
            db,
            registry,
            load,
            assigner,
            events,
        }
    }

    /// Subscribe to desk events. Each dashboard connection calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<DeskEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn assigner(&self) -> &TaskAssigner {
        &self.assigner
    }

    pub fn load(&self) -> &LoadTracker {
        &self.load
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn reassigner(&self) -> &ReassignmentCoordinator {
        &self.reassigner
    }

    pub fn guard(&self) -> &DuplicateGuard {
        &self.guard
    }

    pub fn store(&self) -> &Arc<dyn Database> {
        &self.db
    }

    fn emit(&self, event: DeskEvent) {
        // Ok if nobody is listening.
        let _ = self.events.send(event);
    }

    async fn load_task(&self, task_id: Uuid) -> Result<Task, TaskError> {
        self.db
            .get_task(task_id)
            .await?
            .ok_or(TaskError::TaskNotFound { id: task_id })
    }

    // ── Assignment ──────────────────────────────────────────────────

    /// Store a newly submitted task and try to hand it to a worker.
    ///
    /// The returned task is unassigned when nobody is eligible; the sweep
    /// picks it up later.
    pub async fn submit_task(&self, task: Task) -> Result<Task, TaskError> {
        self.db.insert_task(&task).await?;
        info!(task_id = %task.id, kind = %task.kind, "Task submitted");

        self.try_assign(&task).await?;
        self.load_task(task.id).await
    }

    /// Give an unassigned pending task to the least-loaded eligible worker.
    ///
    /// Returns the chosen worker, or `None` if nobody qualified or the task
    /// was assigned by someone else in the meantime.
    pub async fn try_assign(&self, task: &Task) -> Result<Option<Uuid>, TaskError> {
        let Some(worker_id) = self.assigner.assign(task.kind).await? else {
            return Ok(None);
        };

        let assigned = self
            .db
            .assign_task_if(task.id, None, worker_id, &[TaskStatus::Pending], Utc::now())
            .await?;
        if !assigned {
            return Ok(None);
        }

        // The task already belongs to `worker_id`; a failed charge only skews ranking.
        if let Err(e) = self
            .load
            .record_assignment(worker_id, task.kind, task.amount)
            .await
        {
            warn!(task_id = %task.id, worker_id = %worker_id, error = %e, "Assignment not charged");
        }
        info!(task_id = %task.id, worker_id = %worker_id, "Task assigned");
        self.emit(DeskEvent::TaskAssigned {
            task_id: task.id,
            kind: task.kind,
            worker_id,
        });
        Ok(Some(worker_id))
    }

    // ── Processing ──────────────────────────────────────────────────

    /// Operator pressed "start": refuse duplicates with a clear reason,
    /// then take the lock.
    pub async fn begin_processing(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, TaskError> {
        let check = self.guard.check_duplicate_for(task_id, worker_id).await?;
        match check.reason {
            Some(DuplicateReason::AlreadyCompleted) => {
                return Err(TaskError::AlreadyTerminal {
                    id: task_id,
                    status: TaskStatus::Completed,
                });
            }
            Some(DuplicateReason::AlreadyRejected) => {
                return Err(TaskError::AlreadyTerminal {
                    id: task_id,
                    status: TaskStatus::Rejected,
                });
            }
            Some(DuplicateReason::BeingProcessed { holder, expires_at }) => {
                return Err(TaskError::LockConflict {
                    id: task_id,
                    holder,
                    expires_at,
                });
            }
            None => {}
        }

        let task = self.locks.acquire(task_id, worker_id).await?;
        if let Some(lock) = task.lock.clone() {
            self.emit(DeskEvent::LockAcquired { task_id, lock });
        }
        Ok(task)
    }

    /// Operator pressed "cancel".
    pub async fn release(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, TaskError> {
        let task = self.locks.release(task_id, worker_id).await?;
        self.emit(DeskEvent::LockReleased { task_id, worker_id });
        Ok(task)
    }

    pub async fn complete(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, TaskError> {
        let task = self.locks.complete(task_id, worker_id).await?;
        self.emit(DeskEvent::TaskCompleted { task_id, worker_id });
        Ok(task)
    }

    pub async fn reject(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, TaskError> {
        let task = self.locks.reject(task_id, worker_id).await?;
        self.emit(DeskEvent::TaskRejected { task_id, worker_id });
        Ok(task)
    }

    /// Assignee picks up an open ticket.
    pub async fn start_ticket(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, TaskError> {
        self.move_ticket(task_id, worker_id, &[TaskStatus::Pending], TaskStatus::InProgress, "start")
            .await
    }

    /// Assignee resolves a ticket.
    pub async fn close_ticket(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, TaskError> {
        let task = self
            .move_ticket(
                task_id,
                worker_id,
                &[TaskStatus::Pending, TaskStatus::InProgress],
                TaskStatus::Completed,
                "close",
            )
            .await?;
        self.emit(DeskEvent::TaskCompleted { task_id, worker_id });
        Ok(task)
    }

    async fn move_ticket(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
        action: &'static str,
    ) -> Result<Task, TaskError> {
        if self
            .db
            .transition_ticket(task_id, worker_id, from, to, Utc::now())
            .await?
        {
            info!(task_id = %task_id, worker_id = %worker_id, status = %to, "Ticket moved");
            return self.load_task(task_id).await;
        }

        let task = self.load_task(task_id).await?;
        if task.status.is_terminal() {
            return Err(TaskError::AlreadyTerminal {
                id: task_id,
                status: task.status,
            });
        }
        let reason = if task.kind != TaskKind::Ticket {
            "not a ticket".to_string()
        } else if task.assigned_to != Some(worker_id) {
            "ticket is assigned to someone else".to_string()
        } else {
            format!("ticket is {}", task.status)
        };
        Err(TaskError::InvalidTransition {
            id: task_id,
            action,
            reason,
        })
    }

    // ── Availability ────────────────────────────────────────────────

    /// Worker toggles their own shift. Going offline hands their backlog
    /// to colleagues and returns the report.
    pub async fn set_availability(
        &self,
        worker_id: Uuid,
        available: bool,
    ) -> Result<Option<ReassignmentReport>, TaskError> {
        self.registry
            .set_availability_by_self(worker_id, available)
            .await?;
        self.after_availability_change(worker_id, available).await
    }

    /// End a shift and hand the backlog on.
    pub async fn go_offline(&self, worker_id: Uuid) -> Result<ReassignmentReport, TaskError> {
        let report = self.set_availability(worker_id, false).await?;
        Ok(report.unwrap_or_else(|| ReassignmentReport {
            worker_id,
            ..Default::default()
        }))
    }

    pub async fn go_online(&self, worker_id: Uuid) -> Result<(), TaskError> {
        self.set_availability(worker_id, true).await.map(|_| ())
    }

    /// Administrator override of a worker's shift, optionally locking it.
    pub async fn admin_set_availability(
        &self,
        worker_id: Uuid,
        available: bool,
        locked: bool,
    ) -> Result<Option<ReassignmentReport>, TaskError> {
        self.registry
            .set_availability_by_admin(worker_id, available, locked)
            .await?;
        self.after_availability_change(worker_id, available).await
    }

    /// Administrator deactivates, bans, or restores a worker. A worker who
    /// can no longer take work hands their backlog on like going offline.
    pub async fn set_standing(
        &self,
        worker_id: Uuid,
        is_active: bool,
        is_banned: bool,
    ) -> Result<Option<ReassignmentReport>, TaskError> {
        self.registry
            .set_standing(worker_id, is_active, is_banned)
            .await?;
        if is_active && !is_banned {
            return Ok(None);
        }
        self.hand_off_backlog(worker_id).await.map(Some)
    }

    async fn after_availability_change(
        &self,
        worker_id: Uuid,
        available: bool,
    ) -> Result<Option<ReassignmentReport>, TaskError> {
        self.emit(DeskEvent::WorkerAvailabilityChanged {
            worker_id,
            available,
        });
        if available {
            return Ok(None);
        }
        self.hand_off_backlog(worker_id).await.map(Some)
    }

    async fn hand_off_backlog(&self, worker_id: Uuid) -> Result<ReassignmentReport, TaskError> {
        let report = self.reassigner.reassign_all(worker_id).await?;
        for m in &report.moves {
            self.emit(DeskEvent::TaskReassigned {
                task_id: m.task_id,
                kind: m.kind,
                from: worker_id,
                to: m.to,
            });
        }
        for gap in &report.gaps {
            self.emit(DeskEvent::ReassignmentGap {
                task_id: gap.task_id,
                worker_id,
            });
        }
        Ok(report)
    }
}
