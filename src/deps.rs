//! Dependency graph service.
//!
//! Maintains the directed depends-on edges between tasks, keeps the graph
//! acyclic, and answers blocked/unblocked queries. The cycle check runs
//! before any edge is persisted and is the correctness boundary for the
//! acyclicity invariant; the ordered-pair primary key in storage is the
//! backstop against conflicting concurrent inserts.

use crate::clock::Clock;
use crate::db::Database;
use crate::error::{EngineError, EngineResult};
use crate::types::{BlockedTask, ChainNode, DependencyChain, PrerequisiteRef};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct DependencyGraphService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl DependencyGraphService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Add the edge "dependent depends on prerequisite".
    ///
    /// Rejected when the edge is a self-dependency, either task is unknown,
    /// the exact ordered pair already exists, or the prerequisite already
    /// depends (directly or transitively) on the dependent, which would close
    /// a cycle.
    pub fn add_dependency(&self, dependent: &str, prerequisite: &str) -> EngineResult<()> {
        if dependent == prerequisite {
            return Err(EngineError::InvalidArgument(format!(
                "task {} cannot depend on itself",
                dependent
            )));
        }
        if !self.db.task_exists(dependent)? {
            return Err(EngineError::task_not_found(dependent));
        }
        if !self.db.task_exists(prerequisite)? {
            return Err(EngineError::task_not_found(prerequisite));
        }
        if self.db.dependency_exists(dependent, prerequisite)? {
            return Err(EngineError::AlreadyExists {
                dependent: dependent.to_string(),
                prerequisite: prerequisite.to_string(),
            });
        }
        if self.db.depends_on_transitively(prerequisite, dependent)? {
            debug!(dependent, prerequisite, "edge rejected: would close a cycle");
            return Err(EngineError::WouldCreateCycle {
                dependent: dependent.to_string(),
                prerequisite: prerequisite.to_string(),
            });
        }

        self.db
            .insert_dependency(dependent, prerequisite, self.clock.now_ms())?;
        info!(dependent, prerequisite, "dependency added");
        Ok(())
    }

    /// Remove an edge. No side effects on task status.
    pub fn remove_dependency(&self, dependent: &str, prerequisite: &str) -> EngineResult<()> {
        if !self.db.delete_dependency(dependent, prerequisite)? {
            return Err(EngineError::dependency_not_found(dependent, prerequisite));
        }
        info!(dependent, prerequisite, "dependency removed");
        Ok(())
    }

    /// True iff the task has at least one prerequisite whose status is not
    /// done. Pure read.
    pub fn is_blocked(&self, task_id: &str) -> EngineResult<bool> {
        if !self.db.task_exists(task_id)? {
            return Err(EngineError::task_not_found(task_id));
        }
        Ok(self.db.has_unresolved_prerequisites(task_id)?)
    }

    /// The unresolved prerequisites of a task (empty when unblocked).
    pub fn unresolved_prerequisites(&self, task_id: &str) -> EngineResult<Vec<PrerequisiteRef>> {
        if !self.db.task_exists(task_id)? {
            return Err(EngineError::task_not_found(task_id));
        }
        Ok(self.db.unresolved_prerequisites(task_id)?)
    }

    /// Every task with at least one unresolved prerequisite, for external
    /// blocked-task views.
    pub fn list_blocked(&self) -> EngineResult<Vec<BlockedTask>> {
        let blocked = self
            .db
            .blocked_tasks()?
            .into_iter()
            .map(|(task, unresolved)| BlockedTask { task, unresolved })
            .collect();
        Ok(blocked)
    }

    /// The prerequisite sub-graph rooted at the task, plus everything the
    /// task itself blocks.
    ///
    /// The visited set is threaded through the recursion explicitly, so the
    /// walk terminates even if the stored graph were somehow inconsistent
    /// with the acyclicity invariant.
    pub fn dependency_chain(&self, task_id: &str) -> EngineResult<DependencyChain> {
        if !self.db.task_exists(task_id)? {
            return Err(EngineError::task_not_found(task_id));
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(task_id.to_string());
        let prerequisites = self.chain_nodes(task_id, &mut visited)?;
        let dependents = self.db.transitive_dependents(task_id)?;

        Ok(DependencyChain {
            task_id: task_id.to_string(),
            prerequisites,
            dependents,
        })
    }

    fn chain_nodes(
        &self,
        task_id: &str,
        visited: &mut HashSet<String>,
    ) -> EngineResult<Vec<ChainNode>> {
        let mut nodes = Vec::new();
        for prereq in self.db.direct_prerequisites(task_id)? {
            if !visited.insert(prereq.id.clone()) {
                continue;
            }
            let children = self.chain_nodes(&prereq.id, visited)?;
            nodes.push(ChainNode {
                id: prereq.id,
                title: prereq.title,
                status: prereq.status,
                prerequisites: children,
            });
        }
        Ok(nodes)
    }
}
