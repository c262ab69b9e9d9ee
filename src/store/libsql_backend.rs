//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! fixed-width RFC 3339 (`2026-01-01T00:00:00.000Z`) so that the lock
//! expiry comparisons inside `WHERE` clauses are plain string comparisons.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{Capability, Task, TaskKind, TaskLock, TaskStats, TaskStatus, Worker};
use crate::store::migrations;
use crate::store::traits::Database;

/// Compare-and-set attempts for the withdrawal value total before giving up.
const MAX_STAT_ATTEMPTS: usize = 5;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Raw stored withdrawal total, so the CAS compares the exact text.
    async fn withdrawals_value_raw(&self, id: Uuid) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT withdrawals_value FROM workers WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("withdrawals_value: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("withdrawals_value row: {e}")))?;
                Ok(Some(raw))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("withdrawals_value: {e}"))),
        }
    }

    async fn collect_tasks(&self, sql: &str, args: Vec<libsql::Value>, op: &str) -> Result<Vec<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, args)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op} row: {e}")))?
        {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format for every timestamp column.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.filter(|s| !s.is_empty()).map(|s| parse_datetime(&s))
}

fn parse_optional_uuid(s: Option<String>) -> Option<Uuid> {
    s.filter(|s| !s.is_empty())
        .and_then(|s| Uuid::parse_str(&s).ok())
}

fn parse_decimal(s: &str) -> Result<Decimal, DatabaseError> {
    s.parse::<Decimal>()
        .map_err(|e| DatabaseError::Serialization(format!("decimal {s:?}: {e}")))
}

/// `IN (...)` body for a status filter. Values come from the enum, never user input.
fn status_list(statuses: &[TaskStatus]) -> String {
    if statuses.is_empty() {
        return "NULL".to_string();
    }
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn worker_not_found(id: Uuid) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "worker".into(),
        id: id.to_string(),
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

const WORKER_COLUMNS: &str = "id, name, role, capabilities, is_active, is_banned, available_for_tasks, availability_locked, withdrawals_handled, withdrawals_value, tickets_handled, last_assigned_at, created_at, updated_at";

const TASK_COLUMNS: &str = "id, kind, subject, amount, status, assigned_to, assigned_at, locked_by, locked_at, lock_expiry, processed_by, completed_at, created_at, updated_at";

fn row_to_worker(row: &libsql::Row) -> Result<Worker, DatabaseError> {
    let id_str: String = row.get(0).map_err(|e| DatabaseError::Query(format!("worker.id: {e}")))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Serialization(format!("worker.id parse: {e}")))?;

    let name: String = row.get(1).map_err(|e| DatabaseError::Query(format!("worker.name: {e}")))?;

    let role_str: String = row.get(2).map_err(|e| DatabaseError::Query(format!("worker.role: {e}")))?;
    let role = role_str.parse().map_err(DatabaseError::Serialization)?;

    let caps_str: String = row.get(3).unwrap_or_else(|_| "[]".to_string());
    let capabilities: Vec<Capability> = serde_json::from_str(&caps_str)
        .map_err(|e| DatabaseError::Serialization(format!("worker.capabilities: {e}")))?;

    let flag = |idx: i32| row.get::<i64>(idx).unwrap_or(0) != 0;

    let value_str: String = row.get(9).unwrap_or_else(|_| "0".to_string());

    Ok(Worker {
        id,
        name,
        role,
        capabilities,
        is_active: flag(4),
        is_banned: flag(5),
        available_for_tasks: flag(6),
        availability_locked_by_admin: flag(7),
        task_stats: TaskStats {
            withdrawals_handled: row.get::<i64>(8).unwrap_or(0).max(0) as u64,
            withdrawals_value: parse_decimal(&value_str)?,
            tickets_handled: row.get::<i64>(10).unwrap_or(0).max(0) as u64,
            last_assigned_at: parse_optional_datetime(row.get(11).ok()),
        },
        created_at: parse_datetime(&row.get::<String>(12).unwrap_or_default()),
        updated_at: parse_datetime(&row.get::<String>(13).unwrap_or_default()),
    })
}

fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    let id_str: String = row.get(0).map_err(|e| DatabaseError::Query(format!("task.id: {e}")))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Serialization(format!("task.id parse: {e}")))?;

    let kind_str: String = row.get(1).map_err(|e| DatabaseError::Query(format!("task.kind: {e}")))?;
    let kind: TaskKind = kind_str.parse().map_err(DatabaseError::Serialization)?;

    let subject: String = row.get(2).unwrap_or_default();
    let amount_str: String = row.get(3).unwrap_or_else(|_| "0".to_string());

    let status_str: String = row.get(4).map_err(|e| DatabaseError::Query(format!("task.status: {e}")))?;
    let status: TaskStatus = status_str.parse().map_err(DatabaseError::Serialization)?;

    let lock = match (
        parse_optional_uuid(row.get(7).ok()),
        parse_optional_datetime(row.get(8).ok()),
        parse_optional_datetime(row.get(9).ok()),
    ) {
        (Some(holder), Some(locked_at), Some(expires_at)) => Some(TaskLock {
            holder,
            locked_at,
            expires_at,
        }),
        _ => None,
    };

    Ok(Task {
        id,
        kind,
        subject,
        amount: parse_decimal(&amount_str)?,
        status,
        assigned_to: parse_optional_uuid(row.get(5).ok()),
        assigned_at: parse_optional_datetime(row.get(6).ok()),
        lock,
        processed_by: parse_optional_uuid(row.get(10).ok()),
        completed_at: parse_optional_datetime(row.get(11).ok()),
        created_at: parse_datetime(&row.get::<String>(12).unwrap_or_default()),
        updated_at: parse_datetime(&row.get::<String>(13).unwrap_or_default()),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Workers ─────────────────────────────────────────────────────

    async fn insert_worker(&self, worker: &Worker) -> Result<(), DatabaseError> {
        let capabilities = serde_json::to_string(&worker.capabilities)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO workers ({WORKER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    worker.id.to_string(),
                    worker.name.as_str(),
                    worker.role.as_str(),
                    capabilities,
                    worker.is_active as i64,
                    worker.is_banned as i64,
                    worker.available_for_tasks as i64,
                    worker.availability_locked_by_admin as i64,
                    worker.task_stats.withdrawals_handled as i64,
                    worker.task_stats.withdrawals_value.to_string(),
                    worker.task_stats.tickets_handled as i64,
                    worker.task_stats.last_assigned_at.map(fmt_ts),
                    fmt_ts(worker.created_at),
                    fmt_ts(worker.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_worker: {e}")))?;

        debug!(worker_id = %worker.id, role = worker.role.as_str(), "Worker inserted");
        Ok(())
    }

    async fn get_worker(&self, id: Uuid) -> Result<Option<Worker>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_worker: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_worker(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_worker row: {e}"))),
        }
    }

    async fn list_available_workers(&self) -> Result<Vec<Worker>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {WORKER_COLUMNS} FROM workers \
                     WHERE is_active = 1 AND is_banned = 0 AND available_for_tasks = 1 \
                     ORDER BY created_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_available_workers: {e}")))?;

        let mut workers = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_available_workers row: {e}")))?
        {
            workers.push(row_to_worker(&row)?);
        }
        Ok(workers)
    }

    async fn set_availability_if_unlocked(
        &self,
        id: Uuid,
        available: bool,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE workers SET available_for_tasks = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND availability_locked = 0",
                params![available as i64, fmt_ts(Utc::now()), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_availability_if_unlocked: {e}")))?;
        Ok(count > 0)
    }

    async fn set_availability_by_admin(
        &self,
        id: Uuid,
        available: bool,
        locked: bool,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE workers SET available_for_tasks = ?1, availability_locked = ?2, updated_at = ?3 \
                 WHERE id = ?4",
                params![
                    available as i64,
                    locked as i64,
                    fmt_ts(Utc::now()),
                    id.to_string()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_availability_by_admin: {e}")))?;
        Ok(count > 0)
    }

    async fn set_capabilities(
        &self,
        id: Uuid,
        capabilities: &[Capability],
    ) -> Result<bool, DatabaseError> {
        let caps = serde_json::to_string(capabilities)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let count = self
            .conn()
            .execute(
                "UPDATE workers SET capabilities = ?1, updated_at = ?2 WHERE id = ?3",
                params![caps, fmt_ts(Utc::now()), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_capabilities: {e}")))?;
        Ok(count > 0)
    }

    async fn set_standing(
        &self,
        id: Uuid,
        is_active: bool,
        is_banned: bool,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE workers SET is_active = ?1, is_banned = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    is_active as i64,
                    is_banned as i64,
                    fmt_ts(Utc::now()),
                    id.to_string()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_standing: {e}")))?;
        Ok(count > 0)
    }

    async fn record_assignment(
        &self,
        id: Uuid,
        kind: TaskKind,
        value: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let now = fmt_ts(now);

        if kind == TaskKind::Ticket {
            let count = self
                .conn()
                .execute(
                    "UPDATE workers SET tickets_handled = tickets_handled + 1, \
                     last_assigned_at = ?1, updated_at = ?1 WHERE id = ?2",
                    params![now, id.to_string()],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("record_assignment: {e}")))?;
            if count == 0 {
                return Err(worker_not_found(id));
            }
            return Ok(());
        }

        // Decimal totals can't be summed in SQL without losing precision,
        // so the total is swapped against the exact text we read.
        for _ in 0..MAX_STAT_ATTEMPTS {
            let current_raw = self
                .withdrawals_value_raw(id)
                .await?
                .ok_or_else(|| worker_not_found(id))?;
            let updated = parse_decimal(&current_raw)? + value;

            let count = self
                .conn()
                .execute(
                    "UPDATE workers SET withdrawals_handled = withdrawals_handled + 1, \
                     withdrawals_value = ?1, last_assigned_at = ?2, updated_at = ?2 \
                     WHERE id = ?3 AND withdrawals_value = ?4",
                    params![updated.to_string(), now.clone(), id.to_string(), current_raw],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("record_assignment: {e}")))?;
            if count > 0 {
                return Ok(());
            }
        }

        Err(DatabaseError::Constraint(format!(
            "record_assignment: withdrawal total for worker {id} kept changing"
        )))
    }

    // ── Tasks ───────────────────────────────────────────────────────

    async fn insert_task(&self, task: &Task) -> Result<(), DatabaseError> {
        let lock = task.lock.as_ref();
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    task.id.to_string(),
                    task.kind.as_str(),
                    task.subject.as_str(),
                    task.amount.to_string(),
                    task.status.as_str(),
                    task.assigned_to.map(|id| id.to_string()),
                    task.assigned_at.map(fmt_ts),
                    lock.map(|l| l.holder.to_string()),
                    lock.map(|l| fmt_ts(l.locked_at)),
                    lock.map(|l| fmt_ts(l.expires_at)),
                    task.processed_by.map(|id| id.to_string()),
                    task.completed_at.map(fmt_ts),
                    fmt_ts(task.created_at),
                    fmt_ts(task.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_task: {e}")))?;

        debug!(task_id = %task.id, kind = %task.kind, "Task inserted");
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_task: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_task(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_task row: {e}"))),
        }
    }

    async fn list_tasks_for_assignee(
        &self,
        worker_id: Uuid,
        kind: TaskKind,
        statuses: &[TaskStatus],
    ) -> Result<Vec<Task>, DatabaseError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE assigned_to = ?1 AND kind = ?2 AND status IN ({}) \
             ORDER BY created_at ASC",
            status_list(statuses)
        );
        self.collect_tasks(
            &sql,
            vec![
                libsql::Value::Text(worker_id.to_string()),
                libsql::Value::Text(kind.as_str().to_string()),
            ],
            "list_tasks_for_assignee",
        )
        .await
    }

    async fn list_unassigned_tasks(&self, limit: usize) -> Result<Vec<Task>, DatabaseError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE assigned_to IS NULL AND status = 'pending' \
             ORDER BY created_at ASC LIMIT ?1"
        );
        self.collect_tasks(
            &sql,
            vec![libsql::Value::Integer(limit as i64)],
            "list_unassigned_tasks",
        )
        .await
    }

    async fn assign_task_if(
        &self,
        id: Uuid,
        expected: Option<Uuid>,
        new_assignee: Uuid,
        statuses: &[TaskStatus],
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let statuses = status_list(statuses);
        let now = fmt_ts(now);

        let count = match expected {
            Some(current) => self
                .conn()
                .execute(
                    &format!(
                        "UPDATE tasks SET assigned_to = ?1, assigned_at = ?2, updated_at = ?2 \
                         WHERE id = ?3 AND assigned_to = ?4 AND locked_by IS NULL \
                         AND status IN ({statuses})"
                    ),
                    params![
                        new_assignee.to_string(),
                        now,
                        id.to_string(),
                        current.to_string()
                    ],
                )
                .await,
            None => self
                .conn()
                .execute(
                    &format!(
                        "UPDATE tasks SET assigned_to = ?1, assigned_at = ?2, updated_at = ?2 \
                         WHERE id = ?3 AND assigned_to IS NULL AND locked_by IS NULL \
                         AND status IN ({statuses})"
                    ),
                    params![new_assignee.to_string(), now, id.to_string()],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("assign_task_if: {e}")))?;

        Ok(count > 0)
    }

    async fn try_lock_task(
        &self,
        id: Uuid,
        worker_id: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE tasks SET locked_by = ?1, locked_at = ?2, lock_expiry = ?3, \
                 status = 'in_progress', updated_at = ?2 \
                 WHERE id = ?4 AND kind = 'withdrawal' \
                 AND status IN ('pending', 'in_progress') \
                 AND (locked_by IS NULL OR locked_by = ?1 OR lock_expiry < ?2)",
                params![
                    worker_id.to_string(),
                    fmt_ts(now),
                    fmt_ts(expires_at),
                    id.to_string()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("try_lock_task: {e}")))?;
        Ok(count > 0)
    }

    async fn release_task_lock(
        &self,
        id: Uuid,
        worker_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE tasks SET locked_by = NULL, locked_at = NULL, lock_expiry = NULL, \
                 status = 'pending', updated_at = ?1 \
                 WHERE id = ?2 AND kind = 'withdrawal' AND status = 'in_progress' \
                 AND locked_by = ?3",
                params![fmt_ts(now), id.to_string(), worker_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("release_task_lock: {e}")))?;
        Ok(count > 0)
    }

    async fn finish_locked_task(
        &self,
        id: Uuid,
        worker_id: Uuid,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        if !status.is_terminal() {
            return Err(DatabaseError::Constraint(format!(
                "finish_locked_task: {status} is not a terminal status"
            )));
        }

        let count = self
            .conn()
            .execute(
                "UPDATE tasks SET status = ?1, processed_by = ?2, completed_at = ?3, \
                 locked_by = NULL, locked_at = NULL, lock_expiry = NULL, updated_at = ?3 \
                 WHERE id = ?4 AND kind = 'withdrawal' AND status = 'in_progress' \
                 AND locked_by = ?2",
                params![
                    status.as_str(),
                    worker_id.to_string(),
                    fmt_ts(now),
                    id.to_string()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("finish_locked_task: {e}")))?;
        Ok(count > 0)
    }

    async fn transition_ticket(
        &self,
        id: Uuid,
        worker_id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let from = status_list(from);
        let now = fmt_ts(now);

        let result = if to.is_terminal() {
            self.conn()
                .execute(
                    &format!(
                        "UPDATE tasks SET status = ?1, processed_by = ?2, completed_at = ?3, updated_at = ?3 \
                         WHERE id = ?4 AND kind = 'ticket' AND assigned_to = ?2 AND status IN ({from})"
                    ),
                    params![to.as_str(), worker_id.to_string(), now, id.to_string()],
                )
                .await
        } else {
            self.conn()
                .execute(
                    &format!(
                        "UPDATE tasks SET status = ?1, updated_at = ?2 \
                         WHERE id = ?3 AND kind = 'ticket' AND assigned_to = ?4 AND status IN ({from})"
                    ),
                    params![to.as_str(), now, id.to_string(), worker_id.to_string()],
                )
                .await
        };

        let count = result.map_err(|e| DatabaseError::Query(format!("transition_ticket: {e}")))?;
        Ok(count > 0)
    }

    async fn count_stale_locks(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM tasks \
                 WHERE status = 'in_progress' AND lock_expiry IS NOT NULL AND lock_expiry < ?1",
                params![fmt_ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_stale_locks: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count.max(0) as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_stale_locks: {e}"))),
        }
    }
}
