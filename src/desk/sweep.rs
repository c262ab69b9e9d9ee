//! Assignment sweep — retries tasks that arrived while nobody was eligible.
//!
//! Runs on startup and then every `interval`. Each cycle also counts
//! withdrawals sitting behind an expired lock; those are only logged; the
//! next acquire takes them over.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::TaskDesk;

/// Upper bound on tasks retried per cycle.
const SWEEP_BATCH: usize = 100;

/// What one sweep cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub assigned: usize,
    pub still_unassigned: usize,
    pub stale_locks: usize,
}

/// Spawn the background sweep loop.
pub fn spawn_assignment_sweep(desk: Arc<TaskDesk>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Assignment sweep started (interval: {}s)", interval.as_secs());

        let mut tick = tokio::time::interval(interval);

        // First tick fires immediately
        loop {
            tick.tick().await;
            run_sweep_cycle(&desk).await;
        }
    })
}

/// Single sweep cycle: retry unassigned, then report stale locks.
pub async fn run_sweep_cycle(desk: &TaskDesk) -> SweepSummary {
    let mut summary = SweepSummary::default();

    let pending = match desk.store().list_unassigned_tasks(SWEEP_BATCH).await {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(error = %e, "Failed to list unassigned tasks");
            return summary;
        }
    };

    if pending.is_empty() {
        debug!("No unassigned tasks");
    }

    for task in &pending {
        match desk.try_assign(task).await {
            Ok(Some(_)) => summary.assigned += 1,
            Ok(None) => summary.still_unassigned += 1,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to assign task, will retry next cycle");
                summary.still_unassigned += 1;
            }
        }
    }

    match desk.store().count_stale_locks(Utc::now()).await {
        Ok(n) => summary.stale_locks = n,
        Err(e) => warn!(error = %e, "Failed to count stale locks"),
    }

    if summary.assigned > 0 || summary.still_unassigned > 0 || summary.stale_locks > 0 {
        info!(
            assigned = summary.assigned,
            still_unassigned = summary.still_unassigned,
            stale_locks = summary.stale_locks,
            "Sweep cycle finished"
        );
    }
    summary
}
