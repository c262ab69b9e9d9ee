//! Worker registry — who exists, what they may handle, and whether they're on shift.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::TaskError;
use crate::model::{Capability, TaskKind, Worker};
use crate::store::Database;

/// Read model over worker records plus the availability toggles.
pub struct WorkerRegistry {
    db: Arc<dyn Database>,
}

impl WorkerRegistry {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn register(&self, worker: &Worker) -> Result<(), TaskError> {
        self.db.insert_worker(worker).await?;
        info!(worker_id = %worker.id, role = worker.role.as_str(), "Worker registered");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Worker, TaskError> {
        self.db
            .get_worker(id)
            .await?
            .ok_or(TaskError::WorkerNotFound { id })
    }

    /// Workers that may be handed a new task of `kind` right now.
    ///
    /// An empty list is a normal outcome; the task simply stays unassigned.
    pub async fn eligible_workers(&self, kind: TaskKind) -> Result<Vec<Worker>, TaskError> {
        let workers: Vec<Worker> = self
            .db
            .list_available_workers()
            .await?
            .into_iter()
            .filter(|w| w.is_eligible_for(kind))
            .collect();

        debug!(kind = %kind, count = workers.len(), "Eligible workers");
        Ok(workers)
    }

    /// Worker-initiated shift toggle. Denied when an administrator has
    /// locked this worker's availability.
    pub async fn set_availability_by_self(
        &self,
        id: Uuid,
        available: bool,
    ) -> Result<(), TaskError> {
        if self.db.set_availability_if_unlocked(id, available).await? {
            info!(worker_id = %id, available, "Worker toggled availability");
            return Ok(());
        }

        // Nothing changed: either missing or admin-locked.
        let worker = self.get(id).await?;
        if worker.availability_locked_by_admin {
            return Err(TaskError::AvailabilityLocked { id });
        }
        Err(TaskError::WorkerNotFound { id })
    }

    /// Administrator override; always wins over the worker's own toggle.
    pub async fn set_availability_by_admin(
        &self,
        id: Uuid,
        available: bool,
        locked: bool,
    ) -> Result<(), TaskError> {
        if !self.db.set_availability_by_admin(id, available, locked).await? {
            return Err(TaskError::WorkerNotFound { id });
        }
        info!(worker_id = %id, available, locked, "Administrator set availability");
        Ok(())
    }

    /// Deactivating or banning a worker removes them from eligibility at once.
    pub async fn set_standing(
        &self,
        id: Uuid,
        is_active: bool,
        is_banned: bool,
    ) -> Result<(), TaskError> {
        if !self.db.set_standing(id, is_active, is_banned).await? {
            return Err(TaskError::WorkerNotFound { id });
        }
        info!(worker_id = %id, is_active, is_banned, "Worker standing updated");
        Ok(())
    }

    pub async fn set_capabilities(
        &self,
        id: Uuid,
        capabilities: &[Capability],
    ) -> Result<(), TaskError> {
        if !self.db.set_capabilities(id, capabilities).await? {
            return Err(TaskError::WorkerNotFound { id });
        }
        info!(worker_id = %id, ?capabilities, "Worker capabilities updated");
        Ok(())
    }
}
