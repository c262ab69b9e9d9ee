//! Task data model — withdrawals and tickets, their status, and the lock annotation.

use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::worker::Capability;

/// How long a processing lock stays valid after acquisition.
pub const LOCK_DURATION_SECS: i64 = 300;

/// [`LOCK_DURATION_SECS`] as a chrono duration.
pub fn lock_duration() -> chrono::Duration {
    chrono::Duration::seconds(LOCK_DURATION_SECS)
}

/// `now` at the millisecond precision lock expiries are stored with.
///
/// Lock checks in SQL and in memory must see the same instant, otherwise a
/// lock inside its final millisecond is live to one and expired to the other.
pub fn lock_instant(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(3)
}

/// The two kinds of operator work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Withdrawal,
    Ticket,
}

impl TaskKind {
    /// Capability a worker needs to be handed this kind of task.
    pub fn required_capability(&self) -> Capability {
        match self {
            Self::Withdrawal => Capability::HandleWithdrawals,
            Self::Ticket => Capability::HandleTickets,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Withdrawal => "withdrawal",
            Self::Ticket => "ticket",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "withdrawal" => Ok(Self::Withdrawal),
            "ticket" => Ok(Self::Ticket),
            other => Err(format!("unknown task kind: {other}")),
        }
    }
}

/// Lifecycle status.
///
/// A pending task with an assignee is "assigned"; for tickets, pending is
/// what the support UI calls "open".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl TaskStatus {
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, InProgress)
                | (InProgress, Pending)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (InProgress, Rejected)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A processing claim on a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLock {
    pub holder: Uuid,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TaskLock {
    /// A lock is live up to and including its expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// A unit of operator work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    /// Short human-readable summary (ticket subject, withdrawal reference).
    pub subject: String,
    /// Withdrawal value; zero for tickets.
    pub amount: Decimal,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    /// Present only on withdrawals, only while claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<TaskLock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    fn new(kind: TaskKind, subject: String, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            subject,
            amount,
            status: TaskStatus::Pending,
            assigned_to: None,
            assigned_at: None,
            lock: None,
            processed_by: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new, unassigned withdrawal request.
    pub fn withdrawal(subject: impl Into<String>, amount: Decimal) -> Self {
        Self::new(TaskKind::Withdrawal, subject.into(), amount)
    }

    /// A new, unassigned support ticket.
    pub fn ticket(subject: impl Into<String>) -> Self {
        Self::new(TaskKind::Ticket, subject.into(), Decimal::ZERO)
    }

    /// The lock, if one is held and has not expired at `now`.
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<&TaskLock> {
        self.lock.as_ref().filter(|lock| !lock.is_expired_at(now))
    }
}
