//! Load tracker — per-worker assignment counters used as ranking input.
//!
//! Counters only grow. A task reassigned away from a worker is not taken
//! off that worker's count, so lifetime totals can exceed the tasks a
//! worker currently holds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::error::TaskError;
use crate::model::TaskKind;
use crate::store::Database;

pub struct LoadTracker {
    db: Arc<dyn Database>,
}

impl LoadTracker {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Count one more `kind` task against `worker_id`. `value` is added to
    /// the withdrawal total and ignored for tickets.
    pub async fn record_assignment(
        &self,
        worker_id: Uuid,
        kind: TaskKind,
        value: Decimal,
    ) -> Result<(), TaskError> {
        self.record_assignment_at(worker_id, kind, value, Utc::now()).await
    }

    pub async fn record_assignment_at(
        &self,
        worker_id: Uuid,
        kind: TaskKind,
        value: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), TaskError> {
        let value = match kind {
            TaskKind::Withdrawal => value,
            TaskKind::Ticket => Decimal::ZERO,
        };

        self.db
            .record_assignment(worker_id, kind, value, now)
            .await
            .map_err(|e| match e {
                crate::error::DatabaseError::NotFound { .. } => {
                    TaskError::WorkerNotFound { id: worker_id }
                }
                other => other.into(),
            })?;

        debug!(worker_id = %worker_id, kind = %kind, %value, "Assignment recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::model::{Worker, WorkerRole};
    use crate::store::LibSqlBackend;

    #[tokio::test]
    async fn counters_accumulate_per_kind() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let worker = Worker::new("w", WorkerRole::Admin);
        db.insert_worker(&worker).await.unwrap();
        let tracker = LoadTracker::new(Arc::clone(&db));

        tracker
            .record_assignment(worker.id, TaskKind::Withdrawal, dec!(20))
            .await
            .unwrap();
        tracker
            .record_assignment(worker.id, TaskKind::Ticket, dec!(999))
            .await
            .unwrap();

        let stats = db.get_worker(worker.id).await.unwrap().unwrap().task_stats;
        assert_eq!(stats.withdrawals_handled, 1);
        assert_eq!(stats.withdrawals_value, dec!(20));
        assert_eq!(stats.tickets_handled, 1);
        assert!(stats.last_assigned_at.is_some());
    }

    #[tokio::test]
    async fn unknown_worker_maps_to_not_found() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let tracker = LoadTracker::new(db);
        let err = tracker
            .record_assignment(Uuid::new_v4(), TaskKind::Ticket, Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::WorkerNotFound { .. }));
    }
}
