//! Worker data model — staff accounts, roles, capabilities, and load stats.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskKind;

/// Operator tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Admin,
    Moderator,
    Support,
}

impl WorkerRole {
    /// Capabilities granted to a freshly registered worker of this tier.
    pub fn default_capabilities(&self) -> Vec<Capability> {
        match self {
            Self::Admin => vec![Capability::HandleWithdrawals, Capability::HandleTickets],
            Self::Moderator => vec![Capability::HandleWithdrawals],
            Self::Support => vec![Capability::HandleTickets],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::Support => "support",
        }
    }
}

impl FromStr for WorkerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            "support" => Ok(Self::Support),
            other => Err(format!("unknown worker role: {other}")),
        }
    }
}

/// A permission to handle one kind of task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    HandleWithdrawals,
    HandleTickets,
}

/// Cumulative assignment counters. Only ever incremented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub withdrawals_handled: u64,
    /// Sum of withdrawal amounts assigned to this worker.
    pub withdrawals_value: Decimal,
    pub tickets_handled: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_assigned_at: Option<DateTime<Utc>>,
}

impl TaskStats {
    /// The counter used to rank this worker for `kind`.
    pub fn handled(&self, kind: TaskKind) -> u64 {
        match kind {
            TaskKind::Withdrawal => self.withdrawals_handled,
            TaskKind::Ticket => self.tickets_handled,
        }
    }
}

/// A staff account that can be handed withdrawals or tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub name: String,
    pub role: WorkerRole,
    pub capabilities: Vec<Capability>,
    pub is_active: bool,
    pub is_banned: bool,
    /// Self-declared "on shift" flag.
    pub available_for_tasks: bool,
    /// When set, only an administrator may flip `available_for_tasks`.
    pub availability_locked_by_admin: bool,
    pub task_stats: TaskStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    /// Create an active, off-shift worker with the role's default capabilities.
    pub fn new(name: impl Into<String>, role: WorkerRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            capabilities: role.default_capabilities(),
            is_active: true,
            is_banned: false,
            available_for_tasks: false,
            availability_locked_by_admin: false,
            task_stats: TaskStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set availability.
    pub fn with_availability(mut self, available: bool) -> Self {
        self.available_for_tasks = available;
        self
    }

    /// Builder: replace the capability set.
    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether this worker may be handed a new task of `kind` right now.
    pub fn is_eligible_for(&self, kind: TaskKind) -> bool {
        self.is_active
            && !self.is_banned
            && self.available_for_tasks
            && self.has_capability(kind.required_capability())
    }
}
