//! Task Dependency & Recurrence Engine
//!
//! The two subsystems with real invariants in a task-management backend:
//! a directed dependency graph that must stay acyclic and gates status
//! transitions, and a recurrence scheduler that deterministically computes
//! when a recurring template next spawns a task instance.

pub mod clock;
pub mod db;
pub mod deps;
pub mod error;
pub mod lifecycle;
pub mod recurrence;
pub mod scheduler;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use db::Database;
pub use deps::DependencyGraphService;
pub use error::{EngineError, EngineResult, ErrorCode};
pub use lifecycle::LifecycleCoordinator;
pub use scheduler::RecurrenceScheduler;
