//! Task storage operations.

use super::Database;
use crate::types::{Priority, Task, TaskStatus};
use anyhow::Result;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Input for inserting a task. The lifecycle coordinator builds this for
/// direct creation; the scheduler builds it when stamping out an instance.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Custom task ID (UUID7 generated if not provided).
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Priority,
    pub project_id: Option<String>,
    pub parent_task_id: Option<String>,
    pub estimated_hours: Option<f64>,
    pub start_at: Option<i64>,
    pub due_at: Option<i64>,
    pub is_recurring: bool,
    pub recurring_template_id: Option<String>,
    pub needs_acknowledgment: bool,
}

/// Partial update for the freely mutable task fields. `Some(None)` clears an
/// optional column, `None` leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub estimated_hours: Option<Option<f64>>,
    pub start_at: Option<Option<i64>>,
    pub due_at: Option<Option<i64>>,
}

pub(crate) fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;

    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Backlog),
        priority: Priority::parse(&priority),
        project_id: row.get("project_id")?,
        parent_task_id: row.get("parent_task_id")?,
        estimated_hours: row.get("estimated_hours")?,
        start_at: row.get("start_at")?,
        due_at: row.get("due_at")?,
        archived: row.get::<_, i64>("archived")? != 0,
        is_recurring: row.get::<_, i64>("is_recurring")? != 0,
        recurring_template_id: row.get("recurring_template_id")?,
        needs_acknowledgment: row.get::<_, i64>("needs_acknowledgment")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Insert a task using an existing connection, so the scheduler can make the
/// insert part of the same transaction as the template claim.
pub(crate) fn insert_task_tx(conn: &Connection, input: &NewTask, now: i64) -> Result<Task> {
    let task_id = input
        .id
        .clone()
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let status = input.status.unwrap_or(TaskStatus::Backlog);

    conn.execute(
        "INSERT INTO tasks (
            id, title, description, status, priority, project_id,
            parent_task_id, estimated_hours, start_at, due_at,
            is_recurring, recurring_template_id, needs_acknowledgment,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            &task_id,
            &input.title,
            &input.description,
            status.as_str(),
            input.priority.as_str(),
            &input.project_id,
            &input.parent_task_id,
            input.estimated_hours,
            input.start_at,
            input.due_at,
            input.is_recurring as i64,
            &input.recurring_template_id,
            input.needs_acknowledgment as i64,
            now,
            now,
        ],
    )?;

    get_task_internal(conn, &task_id)?
        .ok_or_else(|| anyhow::anyhow!("task {} vanished after insert", task_id))
}

/// Get a task using an existing connection (avoids re-locking).
pub(crate) fn get_task_internal(conn: &Connection, task_id: &str) -> Result<Option<Task>> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;

    match stmt.query_row(params![task_id], parse_task_row) {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Create a new task. Generates a UUID7 id unless one was provided.
    pub fn create_task(&self, input: &NewTask, now: i64) -> Result<Task> {
        self.with_conn(|conn| insert_task_tx(conn, input, now))
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    pub fn task_exists(&self, task_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Set a task's status. Returns false if the task does not exist.
    pub fn set_task_status(&self, task_id: &str, status: TaskStatus, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, task_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Apply a partial update to the freely mutable fields.
    pub fn update_task(&self, task_id: &str, update: &TaskUpdate, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let mut sets: Vec<String> = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(title) = &update.title {
                sets.push(format!("title = ?{}", values.len() + 1));
                values.push(Box::new(title.clone()));
            }
            if let Some(description) = &update.description {
                sets.push(format!("description = ?{}", values.len() + 1));
                values.push(Box::new(description.clone()));
            }
            if let Some(priority) = update.priority {
                sets.push(format!("priority = ?{}", values.len() + 1));
                values.push(Box::new(priority.as_str().to_string()));
            }
            if let Some(estimated_hours) = update.estimated_hours {
                sets.push(format!("estimated_hours = ?{}", values.len() + 1));
                values.push(Box::new(estimated_hours));
            }
            if let Some(start_at) = update.start_at {
                sets.push(format!("start_at = ?{}", values.len() + 1));
                values.push(Box::new(start_at));
            }
            if let Some(due_at) = update.due_at {
                sets.push(format!("due_at = ?{}", values.len() + 1));
                values.push(Box::new(due_at));
            }

            if sets.is_empty() {
                // Nothing to update; still report whether the task exists.
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM tasks WHERE id = ?1",
                    params![task_id],
                    |row| row.get(0),
                )?;
                return Ok(count > 0);
            }

            sets.push(format!("updated_at = ?{}", values.len() + 1));
            values.push(Box::new(now));
            values.push(Box::new(task_id.to_string()));

            let sql = format!(
                "UPDATE tasks SET {} WHERE id = ?{}",
                sets.join(", "),
                values.len()
            );
            let changed = conn.execute(
                &sql,
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            )?;
            Ok(changed > 0)
        })
    }

    /// Reparent a task. Ancestry validation happens in the lifecycle service.
    pub fn set_task_parent(
        &self,
        task_id: &str,
        parent_task_id: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET parent_task_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![parent_task_id, now, task_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Soft-delete (or restore) a task. Nothing in this subsystem hard-deletes
    /// tasks.
    pub fn set_task_archived(&self, task_id: &str, archived: bool, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET archived = ?1, updated_at = ?2 WHERE id = ?3",
                params![archived as i64, now, task_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Direct subtasks of a task.
    pub fn get_subtasks(&self, task_id: &str) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks WHERE parent_task_id = ?1 ORDER BY created_at",
            )?;
            let tasks = stmt
                .query_map(params![task_id], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    pub fn list_tasks_by_project(
        &self,
        project_id: &str,
        include_archived: bool,
    ) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let sql = if include_archived {
                "SELECT * FROM tasks WHERE project_id = ?1 ORDER BY created_at"
            } else {
                "SELECT * FROM tasks WHERE project_id = ?1 AND archived = 0 ORDER BY created_at"
            };
            let mut stmt = conn.prepare(sql)?;
            let tasks = stmt
                .query_map(params![project_id], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    /// Clear the acknowledgment flag. Returns false if the task is unknown.
    pub fn clear_acknowledgment(&self, task_id: &str, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET needs_acknowledgment = 0, updated_at = ?1 WHERE id = ?2",
                params![now, task_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Every generated instance still awaiting acknowledgment, oldest first,
    /// so consumers can drain the queue systematically.
    pub fn pending_acknowledgments(&self) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks WHERE needs_acknowledgment = 1 ORDER BY created_at ASC",
            )?;
            let tasks = stmt
                .query_map([], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }
}
