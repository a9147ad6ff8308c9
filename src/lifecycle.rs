//! Task lifecycle coordinator.
//!
//! Thin orchestration over the task store: status changes go through the
//! dependency gate, everything else is freely mutable. This is the only
//! place status transitions are gated.

use crate::clock::Clock;
use crate::db::tasks::{NewTask, TaskUpdate};
use crate::db::Database;
use crate::error::{EngineError, EngineResult};
use crate::types::{Task, TaskStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct LifecycleCoordinator {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl LifecycleCoordinator {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Create a task directly (as opposed to scheduler generation).
    pub fn create_task(&self, input: &NewTask) -> EngineResult<Task> {
        if let Some(parent_id) = &input.parent_task_id {
            if !self.db.task_exists(parent_id)? {
                return Err(EngineError::task_not_found(parent_id));
            }
        }
        Ok(self.db.create_task(input, self.clock.now_ms())?)
    }

    pub fn get_task(&self, task_id: &str) -> EngineResult<Task> {
        self.db
            .get_task(task_id)?
            .ok_or_else(|| EngineError::task_not_found(task_id))
    }

    /// Apply a requested status change, subject to the dependency gate.
    ///
    /// Entering in-progress or done requires every prerequisite to be done;
    /// a rejected request carries the unresolved prerequisites so the caller
    /// can explain why. Any state may otherwise transition to any other, and
    /// done tasks may be reopened.
    pub fn request_status_change(
        &self,
        task_id: &str,
        new_status: TaskStatus,
    ) -> EngineResult<Task> {
        if !self.db.task_exists(task_id)? {
            return Err(EngineError::task_not_found(task_id));
        }

        if new_status.is_gated() {
            let blocking = self.db.unresolved_prerequisites(task_id)?;
            if !blocking.is_empty() {
                debug!(
                    task_id,
                    new_status = new_status.as_str(),
                    blockers = blocking.len(),
                    "status change rejected by dependency gate"
                );
                return Err(EngineError::Blocked {
                    task_id: task_id.to_string(),
                    blocking,
                });
            }
        }

        self.db
            .set_task_status(task_id, new_status, self.clock.now_ms())?;
        info!(task_id, status = new_status.as_str(), "status changed");
        self.get_task(task_id)
    }

    /// Update the freely mutable task fields. Never gated.
    pub fn update_details(&self, task_id: &str, update: &TaskUpdate) -> EngineResult<Task> {
        if !self.db.update_task(task_id, update, self.clock.now_ms())? {
            return Err(EngineError::task_not_found(task_id));
        }
        self.get_task(task_id)
    }

    /// Move a task under a new parent (or to the top level with `None`).
    ///
    /// Walks the prospective ancestor chain with a visited set: a task can
    /// never become its own ancestor, mirroring the dependency acyclicity
    /// rule.
    pub fn set_parent(&self, task_id: &str, parent_id: Option<&str>) -> EngineResult<Task> {
        if !self.db.task_exists(task_id)? {
            return Err(EngineError::task_not_found(task_id));
        }

        if let Some(parent_id) = parent_id {
            if parent_id == task_id {
                return Err(EngineError::InvalidArgument(format!(
                    "task {} cannot be its own parent",
                    task_id
                )));
            }
            let mut visited: HashSet<String> = HashSet::new();
            let mut cursor = Some(parent_id.to_string());
            while let Some(current) = cursor {
                if current == task_id {
                    return Err(EngineError::InvalidArgument(format!(
                        "task {} cannot become its own ancestor",
                        task_id
                    )));
                }
                if !visited.insert(current.clone()) {
                    break;
                }
                let ancestor = self
                    .db
                    .get_task(&current)?
                    .ok_or_else(|| EngineError::task_not_found(&current))?;
                cursor = ancestor.parent_task_id;
            }
        }

        self.db
            .set_task_parent(task_id, parent_id, self.clock.now_ms())?;
        self.get_task(task_id)
    }

    /// Soft-delete (or restore) a task. Nothing here hard-deletes tasks.
    pub fn set_archived(&self, task_id: &str, archived: bool) -> EngineResult<Task> {
        if !self.db.set_task_archived(task_id, archived, self.clock.now_ms())? {
            return Err(EngineError::task_not_found(task_id));
        }
        info!(task_id, archived, "archived flag changed");
        self.get_task(task_id)
    }
}
