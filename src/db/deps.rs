//! Dependency edge storage and reachability queries.

use super::tasks::parse_task_row;
use super::Database;
use crate::types::{PrerequisiteRef, Task, TaskDependency, TaskStatus};
use anyhow::Result;
use rusqlite::{params, Connection};
use std::collections::HashSet;

/// Resolve the direct prerequisites of a task using an existing connection.
fn prerequisite_ids(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT prerequisite_task_id FROM task_dependencies WHERE dependent_task_id = ?1",
    )?;
    let ids = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

fn dependent_ids(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT dependent_task_id FROM task_dependencies WHERE prerequisite_task_id = ?1",
    )?;
    let ids = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

fn prerequisite_refs(conn: &Connection, row_sql: &str, task_id: &str) -> Result<Vec<PrerequisiteRef>> {
    let mut stmt = conn.prepare(row_sql)?;
    let refs = stmt
        .query_map(params![task_id], |row| {
            let status: String = row.get(2)?;
            Ok(PrerequisiteRef {
                id: row.get(0)?,
                title: row.get(1)?,
                status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Backlog),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(refs)
}

impl Database {
    /// Insert a dependency edge. The composite primary key rejects a
    /// duplicate ordered pair, which is the backstop against conflicting
    /// concurrent inserts; the caller runs the cycle check first.
    pub fn insert_dependency(&self, dependent: &str, prerequisite: &str, now: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO task_dependencies
                 (dependent_task_id, prerequisite_task_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![dependent, prerequisite, now],
            )?;
            Ok(())
        })
    }

    pub fn dependency_exists(&self, dependent: &str, prerequisite: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM task_dependencies
                 WHERE dependent_task_id = ?1 AND prerequisite_task_id = ?2",
                params![dependent, prerequisite],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Delete an edge. Returns false if it did not exist.
    pub fn delete_dependency(&self, dependent: &str, prerequisite: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM task_dependencies
                 WHERE dependent_task_id = ?1 AND prerequisite_task_id = ?2",
                params![dependent, prerequisite],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_all_dependencies(&self) -> Result<Vec<TaskDependency>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT dependent_task_id, prerequisite_task_id, created_at
                 FROM task_dependencies",
            )?;
            let deps = stmt
                .query_map([], |row| {
                    Ok(TaskDependency {
                        dependent_task_id: row.get(0)?,
                        prerequisite_task_id: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(deps)
        })
    }

    /// Whether `target` is reachable from `start` following depends-on edges.
    ///
    /// Depth-first with an explicit visited set, so diamond-shaped graphs are
    /// walked once per node and the search terminates even on inconsistent
    /// data. This runs before every edge insert and is authoritative for the
    /// acyclicity invariant.
    pub fn depends_on_transitively(&self, start: &str, target: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let mut visited: HashSet<String> = HashSet::new();
            let mut stack: Vec<String> = vec![start.to_string()];

            while let Some(current) = stack.pop() {
                if current == target {
                    return Ok(true);
                }
                if !visited.insert(current.clone()) {
                    continue;
                }
                for prereq in prerequisite_ids(conn, &current)? {
                    if !visited.contains(&prereq) {
                        stack.push(prereq);
                    }
                }
            }

            Ok(false)
        })
    }

    /// Direct prerequisites of a task that are not yet done.
    pub fn unresolved_prerequisites(&self, task_id: &str) -> Result<Vec<PrerequisiteRef>> {
        self.with_conn(|conn| {
            prerequisite_refs(
                conn,
                "SELECT p.id, p.title, p.status
                 FROM task_dependencies d
                 INNER JOIN tasks p ON d.prerequisite_task_id = p.id
                 WHERE d.dependent_task_id = ?1 AND p.status != 'done'
                 ORDER BY p.created_at",
                task_id,
            )
        })
    }

    /// Every task with at least one unresolved prerequisite, paired with the
    /// unresolved prerequisites themselves.
    pub fn blocked_tasks(&self) -> Result<Vec<(Task, Vec<PrerequisiteRef>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT t.*
                 FROM tasks t
                 INNER JOIN task_dependencies d ON t.id = d.dependent_task_id
                 INNER JOIN tasks p ON d.prerequisite_task_id = p.id
                 WHERE p.status != 'done'
                 ORDER BY t.created_at",
            )?;
            let tasks = stmt
                .query_map([], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let mut out = Vec::with_capacity(tasks.len());
            for task in tasks {
                let unresolved = prerequisite_refs(
                    conn,
                    "SELECT p.id, p.title, p.status
                     FROM task_dependencies d
                     INNER JOIN tasks p ON d.prerequisite_task_id = p.id
                     WHERE d.dependent_task_id = ?1 AND p.status != 'done'
                     ORDER BY p.created_at",
                    &task.id,
                )?;
                out.push((task, unresolved));
            }
            Ok(out)
        })
    }

    /// Whether a task has at least one prerequisite that is not done.
    pub fn has_unresolved_prerequisites(&self, task_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM task_dependencies d
                 INNER JOIN tasks p ON d.prerequisite_task_id = p.id
                 WHERE d.dependent_task_id = ?1 AND p.status != 'done'",
                params![task_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Direct prerequisites of a task as (id, title, status) refs.
    pub fn direct_prerequisites(&self, task_id: &str) -> Result<Vec<PrerequisiteRef>> {
        self.with_conn(|conn| {
            prerequisite_refs(
                conn,
                "SELECT p.id, p.title, p.status
                 FROM task_dependencies d
                 INNER JOIN tasks p ON d.prerequisite_task_id = p.id
                 WHERE d.dependent_task_id = ?1
                 ORDER BY p.created_at",
                task_id,
            )
        })
    }

    /// Transitive dependents of a task: everything that directly or
    /// indirectly waits on it. Visited-set bounded.
    pub fn transitive_dependents(&self, task_id: &str) -> Result<Vec<PrerequisiteRef>> {
        self.with_conn(|conn| {
            let mut visited: HashSet<String> = HashSet::new();
            let mut stack: Vec<String> = vec![task_id.to_string()];
            let mut found: Vec<String> = Vec::new();

            while let Some(current) = stack.pop() {
                if !visited.insert(current.clone()) {
                    continue;
                }
                if current != task_id {
                    found.push(current.clone());
                }
                for dependent in dependent_ids(conn, &current)? {
                    if !visited.contains(&dependent) {
                        stack.push(dependent);
                    }
                }
            }

            let mut refs = Vec::with_capacity(found.len());
            for id in found {
                if let Some(task) = super::tasks::get_task_internal(conn, &id)? {
                    refs.push(PrerequisiteRef {
                        id: task.id,
                        title: task.title,
                        status: task.status,
                    });
                }
            }
            Ok(refs)
        })
    }
}
