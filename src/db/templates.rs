//! Recurring template storage operations.

use super::Database;
use crate::types::{Priority, RecurrenceConfig, RecurrencePattern, RecurringTemplate};
use anyhow::Result;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Input for creating a template. `next_generation_at` is computed by the
/// scheduler from the creation instant, never supplied by callers.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub estimated_hours: Option<f64>,
    pub project_id: String,
    pub pattern: RecurrencePattern,
    pub config: RecurrenceConfig,
}

/// Partial update for a template. Pattern or config changes force the
/// scheduler to recompute `next_generation_at`.
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub estimated_hours: Option<Option<f64>>,
    pub project_id: Option<String>,
    pub pattern: Option<RecurrencePattern>,
    pub config: Option<RecurrenceConfig>,
}

fn parse_template_row(row: &Row) -> rusqlite::Result<RecurringTemplate> {
    let priority: String = row.get("priority")?;
    let pattern: String = row.get("pattern")?;
    let config_json: String = row.get("config")?;

    Ok(RecurringTemplate {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        priority: Priority::parse(&priority),
        estimated_hours: row.get("estimated_hours")?,
        project_id: row.get("project_id")?,
        pattern: RecurrencePattern::parse(&pattern),
        config: serde_json::from_str(&config_json).unwrap_or_default(),
        active: row.get::<_, i64>("active")? != 0,
        last_generated_at: row.get("last_generated_at")?,
        next_generation_at: row.get("next_generation_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn get_template_internal(
    conn: &Connection,
    template_id: &str,
) -> Result<Option<RecurringTemplate>> {
    let mut stmt = conn.prepare("SELECT * FROM recurring_templates WHERE id = ?1")?;

    match stmt.query_row(params![template_id], parse_template_row) {
        Ok(template) => Ok(Some(template)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Claim a template for one due cycle: advance `next_generation_at` and stamp
/// `last_generated_at`, guarded on the previously observed scheduled time.
///
/// Compare-and-swap semantics: if a concurrent run already advanced the
/// template, zero rows match and the claim fails, so one due cycle never
/// yields two instances.
pub(crate) fn claim_template_tx(
    conn: &Connection,
    template_id: &str,
    expected_next: i64,
    new_next: i64,
    now: i64,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE recurring_templates
         SET last_generated_at = ?1, next_generation_at = ?2, updated_at = ?3
         WHERE id = ?4 AND active = 1 AND next_generation_at = ?5",
        params![now, new_next, now, template_id, expected_next],
    )?;
    Ok(changed == 1)
}

impl Database {
    pub fn create_template(
        &self,
        input: &NewTemplate,
        next_generation_at: i64,
        now: i64,
    ) -> Result<RecurringTemplate> {
        let template_id = input
            .id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let config_json = serde_json::to_string(&input.config)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO recurring_templates (
                    id, title, description, priority, estimated_hours,
                    project_id, pattern, config, active,
                    last_generated_at, next_generation_at, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, NULL, ?9, ?10, ?11)",
                params![
                    &template_id,
                    &input.title,
                    &input.description,
                    input.priority.as_str(),
                    input.estimated_hours,
                    &input.project_id,
                    input.pattern.as_str(),
                    config_json,
                    next_generation_at,
                    now,
                    now,
                ],
            )?;

            get_template_internal(conn, &template_id)?.ok_or_else(|| {
                anyhow::anyhow!("template {} vanished after insert", template_id)
            })
        })
    }

    pub fn get_template(&self, template_id: &str) -> Result<Option<RecurringTemplate>> {
        self.with_conn(|conn| get_template_internal(conn, template_id))
    }

    /// Apply a partial update. When the update touched pattern or config the
    /// scheduler passes the recomputed `next_generation_at` alongside.
    pub fn update_template(
        &self,
        template_id: &str,
        update: &TemplateUpdate,
        next_generation_at: Option<i64>,
        now: i64,
    ) -> Result<bool> {
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
            if let Some(project_id) = &update.project_id {
                sets.push(format!("project_id = ?{}", values.len() + 1));
                values.push(Box::new(project_id.clone()));
            }
            if let Some(pattern) = &update.pattern {
                sets.push(format!("pattern = ?{}", values.len() + 1));
                values.push(Box::new(pattern.as_str().to_string()));
            }
            if let Some(config) = &update.config {
                sets.push(format!("config = ?{}", values.len() + 1));
                values.push(Box::new(serde_json::to_string(config)?));
            }
            if let Some(next) = next_generation_at {
                sets.push(format!("next_generation_at = ?{}", values.len() + 1));
                values.push(Box::new(next));
            }

            if sets.is_empty() {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM recurring_templates WHERE id = ?1",
                    params![template_id],
                    |row| row.get(0),
                )?;
                return Ok(count > 0);
            }

            sets.push(format!("updated_at = ?{}", values.len() + 1));
            values.push(Box::new(now));
            values.push(Box::new(template_id.to_string()));

            let sql = format!(
                "UPDATE recurring_templates SET {} WHERE id = ?{}",
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

    /// Halt or resume generation without discarding history.
    pub fn set_template_active(&self, template_id: &str, active: bool, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE recurring_templates SET active = ?1, updated_at = ?2 WHERE id = ?3",
                params![active as i64, now, template_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Hard-delete a template. Generated instances keep existing; their
    /// template reference is cleared by the schema's ON DELETE SET NULL.
    pub fn delete_template(&self, template_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM recurring_templates WHERE id = ?1",
                params![template_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Active templates whose scheduled time is at or before `now`.
    pub fn due_templates(&self, now: i64) -> Result<Vec<RecurringTemplate>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM recurring_templates
                 WHERE active = 1 AND next_generation_at <= ?1
                 ORDER BY next_generation_at",
            )?;
            let templates = stmt
                .query_map(params![now], parse_template_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(templates)
        })
    }

    pub fn list_templates(&self) -> Result<Vec<RecurringTemplate>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM recurring_templates ORDER BY created_at")?;
            let templates = stmt
                .query_map([], parse_template_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(templates)
        })
    }
}
