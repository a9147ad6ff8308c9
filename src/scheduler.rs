//! Recurrence scheduler.
//!
//! Owns template CRUD, the periodic generation of task instances from due
//! templates, and the acknowledgment queue for generated instances. A
//! periodic driver (timer or external cron-like caller) invokes
//! `generate_due_templates`; time always comes from the injected clock.

use crate::clock::Clock;
use crate::db::tasks::NewTask;
use crate::db::templates::{claim_template_tx, get_template_internal, NewTemplate, TemplateUpdate};
use crate::db::{projects, tasks, Database};
use crate::error::{EngineError, EngineResult};
use crate::recurrence::compute_next_generation;
use crate::types::{
    GenerationFailure, GenerationReport, RecurringTemplate, Task, TaskStatus,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).expect("stored epoch millis are within chrono range")
}

pub struct RecurrenceScheduler {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl RecurrenceScheduler {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Create a template. `next_generation_at` is derived from the creation
    /// instant via the recurrence function; callers never supply it.
    pub fn create_template(&self, input: &NewTemplate) -> EngineResult<RecurringTemplate> {
        input
            .config
            .validate()
            .map_err(EngineError::InvalidArgument)?;

        let now = self.clock.now();
        let next = compute_next_generation(now, &input.pattern, &input.config);
        let template =
            self.db
                .create_template(input, next.timestamp_millis(), now.timestamp_millis())?;
        info!(
            template_id = %template.id,
            pattern = template.pattern.as_str(),
            "template created"
        );
        Ok(template)
    }

    /// Apply a partial update. A change to pattern or config recomputes
    /// `next_generation_at` from the last generation (or creation) instant,
    /// keeping it strictly derivable from the recurrence function.
    pub fn update_template(
        &self,
        template_id: &str,
        update: &TemplateUpdate,
    ) -> EngineResult<RecurringTemplate> {
        let existing = self
            .db
            .get_template(template_id)?
            .ok_or_else(|| EngineError::template_not_found(template_id))?;

        if let Some(config) = &update.config {
            config.validate().map_err(EngineError::InvalidArgument)?;
        }

        let recomputed = if update.pattern.is_some() || update.config.is_some() {
            let pattern = update.pattern.clone().unwrap_or(existing.pattern);
            let config = update.config.clone().unwrap_or(existing.config);
            let from = ms_to_datetime(existing.last_generated_at.unwrap_or(existing.created_at));
            Some(compute_next_generation(from, &pattern, &config).timestamp_millis())
        } else {
            None
        };

        self.db
            .update_template(template_id, update, recomputed, self.clock.now_ms())?;
        let updated = self
            .db
            .get_template(template_id)?
            .ok_or_else(|| EngineError::template_not_found(template_id))?;
        Ok(updated)
    }

    /// Halt or resume generation. History is kept either way.
    pub fn set_template_active(&self, template_id: &str, active: bool) -> EngineResult<()> {
        if !self
            .db
            .set_template_active(template_id, active, self.clock.now_ms())?
        {
            return Err(EngineError::template_not_found(template_id));
        }
        info!(template_id, active, "template activation changed");
        Ok(())
    }

    pub fn delete_template(&self, template_id: &str) -> EngineResult<()> {
        if !self.db.delete_template(template_id)? {
            return Err(EngineError::template_not_found(template_id));
        }
        info!(template_id, "template deleted");
        Ok(())
    }

    pub fn get_template(&self, template_id: &str) -> EngineResult<RecurringTemplate> {
        self.db
            .get_template(template_id)?
            .ok_or_else(|| EngineError::template_not_found(template_id))
    }

    pub fn list_templates(&self) -> EngineResult<Vec<RecurringTemplate>> {
        Ok(self.db.list_templates()?)
    }

    /// Generate one instance for every active template whose scheduled time
    /// has passed. One template's failure never aborts the rest of the batch;
    /// a failed template keeps its `next_generation_at` for a later retry.
    pub fn generate_due_templates(&self) -> EngineResult<GenerationReport> {
        let now = self.clock.now();
        let due = self.db.due_templates(now.timestamp_millis())?;

        let mut report = GenerationReport::default();
        for template in due {
            match self.generate_one(&template.id, now) {
                Ok(task) => report.generated.push(task),
                Err(err) => {
                    warn!(
                        template_id = %template.id,
                        error = %err,
                        "template generation failed; left for retry"
                    );
                    report.failures.push(GenerationFailure {
                        template_id: template.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            generated = report.generated_count(),
            failed = report.failures.len(),
            "generation run complete"
        );
        Ok(report)
    }

    /// Manually generate from a single template regardless of its due time.
    pub fn trigger_template(&self, template_id: &str) -> EngineResult<Task> {
        let template = self
            .db
            .get_template(template_id)?
            .ok_or_else(|| EngineError::template_not_found(template_id))?;
        if !template.active {
            return Err(EngineError::InvalidArgument(format!(
                "template {} is not active",
                template_id
            )));
        }
        self.generate_one(template_id, self.clock.now())
    }

    /// Stamp out one instance and advance the template, atomically.
    ///
    /// The instance insert and the template claim share a transaction; the
    /// claim is a compare-and-swap on `next_generation_at`, so two
    /// overlapping runs cannot both produce an instance for the same due
    /// cycle — the loser rolls back its insert and reports `Conflict`.
    ///
    /// The next scheduled time is computed from the template's previous
    /// scheduled time, not from `now`: a late-running driver neither
    /// compresses nor skips the cadence.
    fn generate_one(&self, template_id: &str, now: DateTime<Utc>) -> EngineResult<Task> {
        let now_ms = now.timestamp_millis();

        let result = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let template = get_template_internal(&tx, template_id)?.ok_or_else(|| {
                anyhow::Error::new(EngineError::template_not_found(template_id))
            })?;

            if !projects::project_exists_internal(&tx, &template.project_id)? {
                return Err(anyhow::Error::new(EngineError::project_not_found(
                    &template.project_id,
                )));
            }

            let input = NewTask {
                title: template.title.clone(),
                description: template.description.clone(),
                status: Some(TaskStatus::Todo),
                priority: template.priority,
                project_id: Some(template.project_id.clone()),
                estimated_hours: template.estimated_hours,
                is_recurring: true,
                recurring_template_id: Some(template.id.clone()),
                needs_acknowledgment: true,
                ..Default::default()
            };
            let task = tasks::insert_task_tx(&tx, &input, now_ms)?;

            let next = compute_next_generation(
                ms_to_datetime(template.next_generation_at),
                &template.pattern,
                &template.config,
            );
            let claimed = claim_template_tx(
                &tx,
                template_id,
                template.next_generation_at,
                next.timestamp_millis(),
                now_ms,
            )?;
            if !claimed {
                // A concurrent run advanced the template first; dropping the
                // transaction rolls back the instance insert.
                return Err(anyhow::Error::new(EngineError::Conflict {
                    template_id: template_id.to_string(),
                }));
            }

            tx.commit()?;
            Ok(task)
        });

        result.map_err(EngineError::from)
    }

    /// Clear the acknowledgment flag on a generated instance.
    pub fn acknowledge_instance(&self, task_id: &str) -> EngineResult<Task> {
        if !self.db.clear_acknowledgment(task_id, self.clock.now_ms())? {
            return Err(EngineError::task_not_found(task_id));
        }
        self.db
            .get_task(task_id)?
            .ok_or_else(|| EngineError::task_not_found(task_id))
    }

    /// Generated instances awaiting acknowledgment, oldest first.
    pub fn list_pending_acknowledgments(&self) -> EngineResult<Vec<Task>> {
        Ok(self.db.pending_acknowledgments()?)
    }
}
