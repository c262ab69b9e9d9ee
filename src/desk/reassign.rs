//! Reassignment coordinator — hands an offline worker's backlog to others.
//!
//! Only unstarted work moves: withdrawals still pending (a locked one stays
//! with whoever is processing it) and tickets that are open or in progress.
//! Anything that can't be placed stays with the departing worker and is
//! reported as a gap for manual follow-up.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::assigner::TaskAssigner;
use super::load::LoadTracker;
use crate::error::TaskError;
use crate::model::{Task, TaskKind, TaskStatus};
use crate::store::Database;

const WITHDRAWAL_BACKLOG: &[TaskStatus] = &[TaskStatus::Pending];
const TICKET_BACKLOG: &[TaskStatus] = &[TaskStatus::Pending, TaskStatus::InProgress];

fn backlog_statuses(kind: TaskKind) -> &'static [TaskStatus] {
    match kind {
        TaskKind::Withdrawal => WITHDRAWAL_BACKLOG,
        TaskKind::Ticket => TICKET_BACKLOG,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reassignment {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub to: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// Nobody else was eligible for this kind of task.
    NoEligibleWorker,
    /// The task was picked up or changed while we were moving it.
    ChangedConcurrently,
    /// The store failed before the task could be moved.
    StoreError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReassignmentGap {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub reason: GapReason,
}

/// Outcome of [`ReassignmentCoordinator::reassign_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReassignmentReport {
    pub worker_id: Uuid,
    pub withdrawals_reassigned: usize,
    pub tickets_reassigned: usize,
    pub moves: Vec<Reassignment>,
    pub gaps: Vec<ReassignmentGap>,
}

impl ReassignmentReport {
    /// Tasks the worker held when reassignment started.
    pub fn outstanding(&self) -> usize {
        self.moves.len() + self.gaps.len()
    }

    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

pub struct ReassignmentCoordinator {
    db: Arc<dyn Database>,
    assigner: Arc<TaskAssigner>,
    load: Arc<LoadTracker>,
}

impl ReassignmentCoordinator {
    pub fn new(db: Arc<dyn Database>, assigner: Arc<TaskAssigner>, load: Arc<LoadTracker>) -> Self {
        Self { db, assigner, load }
    }

    /// Move every unstarted task of `worker_id` to the least-loaded
    /// eligible colleague.
    pub async fn reassign_all(&self, worker_id: Uuid) -> Result<ReassignmentReport, TaskError> {
        if self.db.get_worker(worker_id).await?.is_none() {
            return Err(TaskError::WorkerNotFound { id: worker_id });
        }

        let mut report = ReassignmentReport {
            worker_id,
            ..Default::default()
        };

        for kind in [TaskKind::Withdrawal, TaskKind::Ticket] {
            let backlog = self
                .db
                .list_tasks_for_assignee(worker_id, kind, backlog_statuses(kind))
                .await?;

            for task in backlog {
                self.reassign_one(worker_id, &task, &mut report).await;
            }
        }

        if report.is_complete() {
            info!(
                worker_id = %worker_id,
                withdrawals = report.withdrawals_reassigned,
                tickets = report.tickets_reassigned,
                "Reassignment complete"
            );
        } else {
            warn!(
                worker_id = %worker_id,
                withdrawals = report.withdrawals_reassigned,
                tickets = report.tickets_reassigned,
                gaps = report.gaps.len(),
                "Reassignment left tasks with offline worker"
            );
        }

        Ok(report)
    }

    /// Place one task. Failures become gaps so the rest of the backlog is
    /// still attempted and reported.
    async fn reassign_one(&self, from: Uuid, task: &Task, report: &mut ReassignmentReport) {
        let gap = |reason| ReassignmentGap {
            task_id: task.id,
            kind: task.kind,
            reason,
        };

        // The departing worker is normally already off shift; excluding it
        // keeps a premature call from handing the task straight back.
        let to = match self.assigner.assign_excluding(task.kind, &[from]).await {
            Ok(Some(to)) => to,
            Ok(None) => {
                report.gaps.push(gap(GapReason::NoEligibleWorker));
                return;
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to pick a new owner");
                report.gaps.push(gap(GapReason::StoreError));
                return;
            }
        };

        match self
            .db
            .assign_task_if(task.id, Some(from), to, backlog_statuses(task.kind), Utc::now())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                report.gaps.push(gap(GapReason::ChangedConcurrently));
                return;
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to move task");
                report.gaps.push(gap(GapReason::StoreError));
                return;
            }
        }

        // The task already belongs to `to`; a failed charge only skews ranking.
        if let Err(e) = self.load.record_assignment(to, task.kind, task.amount).await {
            warn!(task_id = %task.id, worker_id = %to, error = %e, "Assignment not charged");
        }

        info!(task_id = %task.id, kind = %task.kind, from = %from, to = %to, "Task reassigned");
        match task.kind {
            TaskKind::Withdrawal => report.withdrawals_reassigned += 1,
            TaskKind::Ticket => report.tickets_reassigned += 1,
        }
        report.moves.push(Reassignment {
            task_id: task.id,
            kind: task.kind,
            to,
        });
    }
}
