//! Task assigner — greedy least-loaded worker selection.
//!
//! Candidates are ranked by how many tasks of the same kind they have been
//! handed, then by how long ago they were last handed anything (never
//! assigned ranks first). This is not strict rotation: it self-corrects as
//! workers come and go or process at different speeds.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::registry::WorkerRegistry;
use crate::error::TaskError;
use crate::model::{TaskKind, Worker};

pub struct TaskAssigner {
    registry: Arc<WorkerRegistry>,
}

impl TaskAssigner {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }

    /// Pick the worker who should receive a new `kind` task.
    ///
    /// `None` means nobody is eligible; the caller leaves the task unassigned.
    pub async fn assign(&self, kind: TaskKind) -> Result<Option<Uuid>, TaskError> {
        self.assign_excluding(kind, &[]).await
    }

    /// Like [`assign`](Self::assign) but never picks any of `excluded`.
    pub async fn assign_excluding(
        &self,
        kind: TaskKind,
        excluded: &[Uuid],
    ) -> Result<Option<Uuid>, TaskError> {
        let mut candidates = self.registry.eligible_workers(kind).await?;
        candidates.retain(|w| !excluded.contains(&w.id));

        let Some(chosen) = rank_candidates(candidates, kind).into_iter().next() else {
            info!(kind = %kind, "No eligible worker; task stays unassigned");
            return Ok(None);
        };

        debug!(
            kind = %kind,
            worker_id = %chosen.id,
            handled = chosen.task_stats.handled(kind),
            "Selected least-loaded worker"
        );
        Ok(Some(chosen.id))
    }
}

/// Order candidates best-first for `kind`.
///
/// The sort is stable, so workers equal on both keys keep the store's order.
pub fn rank_candidates(mut candidates: Vec<Worker>, kind: TaskKind) -> Vec<Worker> {
    candidates.sort_by(|a, b| {
        a.task_stats
            .handled(kind)
            .cmp(&b.task_stats.handled(kind))
            // `None < Some(_)`: never-assigned workers win ties.
            .then_with(|| a.task_stats.last_assigned_at.cmp(&b.task_stats.last_assigned_at))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::*;
    use crate::desk::load::LoadTracker;
    use crate::model::WorkerRole;
    use crate::store::{Database, LibSqlBackend};

    fn worker_with(handled: u64, last: Option<i64>) -> Worker {
        let mut w = Worker::new("w", WorkerRole::Admin).with_availability(true);
        w.task_stats.tickets_handled = handled;
        w.task_stats.last_assigned_at = last.map(|mins| Utc::now() - Duration::minutes(mins));
        w
    }

    #[test]
    fn rank_prefers_lowest_count() {
        let busy = worker_with(5, Some(1));
        let idle = worker_with(1, Some(1));
        let ranked = rank_candidates(vec![busy.clone(), idle.clone()], TaskKind::Ticket);
        assert_eq!(ranked[0].id, idle.id);
    }

    #[test]
    fn rank_breaks_ties_by_oldest_assignment() {
        let recent = worker_with(2, Some(1));
        let stale = worker_with(2, Some(60));
        let never = worker_with(2, None);
        let ranked = rank_candidates(
            vec![recent.clone(), stale.clone(), never.clone()],
            TaskKind::Ticket,
        );
        let ids: Vec<Uuid> = ranked.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![never.id, stale.id, recent.id]);
    }

    #[test]
    fn rank_uses_the_kind_specific_counter() {
        let mut a = worker_with(0, None);
        a.task_stats.withdrawals_handled = 9;
        let b = worker_with(3, None);
        let ranked = rank_candidates(vec![a.clone(), b.clone()], TaskKind::Withdrawal);
        assert_eq!(ranked[0].id, b.id);
        let ranked = rank_candidates(vec![a.clone(), b.clone()], TaskKind::Ticket);
        assert_eq!(ranked[0].id, a.id);
    }

    async fn setup(n: usize) -> (Arc<dyn Database>, TaskAssigner, LoadTracker, Vec<Uuid>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let mut ids = Vec::new();
        for i in 0..n {
            let w = Worker::new(format!("w{i}"), WorkerRole::Admin).with_availability(true);
            db.insert_worker(&w).await.unwrap();
            ids.push(w.id);
        }
        let registry = Arc::new(WorkerRegistry::new(Arc::clone(&db)));
        let assigner = TaskAssigner::new(registry);
        let tracker = LoadTracker::new(Arc::clone(&db));
        (db, assigner, tracker, ids)
    }

    #[tokio::test]
    async fn three_workers_three_tasks_one_each() {
        let (_db, assigner, tracker, ids) = setup(3).await;
        let mut picked = Vec::new();
        for _ in 0..3 {
            let id = assigner.assign(TaskKind::Withdrawal).await.unwrap().unwrap();
            tracker
                .record_assignment(id, TaskKind::Withdrawal, Decimal::ZERO)
                .await
                .unwrap();
            picked.push(id);
        }
        picked.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(picked, expected);
    }

    #[tokio::test]
    async fn sequential_assignment_stays_balanced() {
        for (workers, tasks) in [(2usize, 7usize), (3, 10), (4, 4), (5, 13)] {
            let (db, assigner, tracker, ids) = setup(workers).await;
            for _ in 0..tasks {
                let id = assigner.assign(TaskKind::Ticket).await.unwrap().unwrap();
                tracker
                    .record_assignment(id, TaskKind::Ticket, Decimal::ZERO)
                    .await
                    .unwrap();
            }

            let mut counts = Vec::new();
            for id in &ids {
                counts.push(db.get_worker(*id).await.unwrap().unwrap().task_stats.tickets_handled);
            }
            let max = *counts.iter().max().unwrap();
            let min = *counts.iter().min().unwrap();
            assert!(max - min <= 1, "unbalanced {counts:?} for {workers}x{tasks}");
            assert!(max as usize <= tasks.div_ceil(workers));
            assert_eq!(counts.iter().sum::<u64>() as usize, tasks);
        }
    }

    #[tokio::test]
    async fn no_eligible_worker_returns_none() {
        let (_db, assigner, _tracker, _ids) = setup(0).await;
        assert!(assigner.assign(TaskKind::Ticket).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn excluded_workers_are_never_picked() {
        let (_db, assigner, _tracker, ids) = setup(2).await;
        let picked = assigner
            .assign_excluding(TaskKind::Ticket, &[ids[0]])
            .await
            .unwrap();
        assert_eq!(picked, Some(ids[1]));
        assert!(assigner
            .assign_excluding(TaskKind::Ticket, &ids)
            .await
            .unwrap()
            .is_none());
    }
}
