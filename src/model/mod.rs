//! Desk data model — workers, tasks, locks, and events.

pub mod event;
pub mod task;
pub mod worker;

pub use event::DeskEvent;
pub use task::{LOCK_DURATION_SECS, Task, TaskKind, TaskLock, TaskStatus, lock_duration, lock_instant};
pub use worker::{Capability, TaskStats, Worker, WorkerRole};
