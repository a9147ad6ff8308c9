//! Minimal project store.
//!
//! Projects are an external collaborator; the engine only needs an existence
//! check to validate a template's target project at generation time. This
//! table is the single-store stand-in for that contract.

use super::Database;
use anyhow::Result;
use rusqlite::{params, Connection};

pub(crate) fn project_exists_internal(conn: &Connection, project_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM projects WHERE id = ?1",
        params![project_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

impl Database {
    pub fn create_project(&self, project_id: &str, name: &str, now: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![project_id, name, now],
            )?;
            Ok(())
        })
    }

    pub fn project_exists(&self, project_id: &str) -> Result<bool> {
        self.with_conn(|conn| project_exists_internal(conn, project_id))
    }

    /// Remove a project. Tasks and templates keep their project id; the
    /// scheduler discovers the absence at generation time.
    pub fn delete_project(&self, project_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM projects WHERE id = ?1",
                params![project_id],
            )?;
            Ok(changed > 0)
        })
    }
}
