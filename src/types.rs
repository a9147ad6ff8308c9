//! Core entity types shared by the dependency graph, scheduler and lifecycle
//! services.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Task status.
///
/// There is no enforced linear order between states; the only gate is that
/// entering `InProgress` or `Done` requires every prerequisite to be done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "backlog" => Some(TaskStatus::Backlog),
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "review" => Some(TaskStatus::Review),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }

    /// States that may only be entered when no prerequisite is unresolved.
    pub fn is_gated(&self) -> bool {
        matches!(self, TaskStatus::InProgress | TaskStatus::Done)
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Parse a priority string. Unrecognized values fall back to medium.
    pub fn parse(s: &str) -> Self {
        match s {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Medium,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// A task. Created directly or stamped out by the recurrence scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub project_id: Option<String>,
    /// Subtask ownership: at most one parent, never cyclic.
    pub parent_task_id: Option<String>,
    pub estimated_hours: Option<f64>,
    pub start_at: Option<i64>,
    pub due_at: Option<i64>,
    pub archived: bool,
    pub is_recurring: bool,
    pub recurring_template_id: Option<String>,
    /// Set when the scheduler generates the instance, cleared by an external
    /// acknowledgment call.
    pub needs_acknowledgment: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A directed dependency edge: the dependent task depends on the prerequisite.
/// Never mutated; only created and removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDependency {
    pub dependent_task_id: String,
    pub prerequisite_task_id: String,
    pub created_at: i64,
}

/// Compact reference to a task, used when explaining why another task is
/// blocked or what a task blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrerequisiteRef {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
}

/// A blocked task together with the prerequisites that are still unresolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedTask {
    pub task: Task,
    pub unresolved: Vec<PrerequisiteRef>,
}

/// One node in a prerequisite chain: the task plus its own prerequisites,
/// recursively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainNode {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub prerequisites: Vec<ChainNode>,
}

/// The full dependency picture around one task: everything it waits on and
/// everything waiting on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyChain {
    pub task_id: String,
    pub prerequisites: Vec<ChainNode>,
    /// Tasks this task transitively blocks.
    pub dependents: Vec<PrerequisiteRef>,
}

/// Recurrence cadence for a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    /// Anything unrecognized. Scheduling falls back to daily cadence.
    #[serde(untagged)]
    Custom(String),
}

impl RecurrencePattern {
    pub fn as_str(&self) -> &str {
        match self {
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::Monthly => "monthly",
            RecurrencePattern::Custom(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "daily" => RecurrencePattern::Daily,
            "weekly" => RecurrencePattern::Weekly,
            "monthly" => RecurrencePattern::Monthly,
            other => RecurrencePattern::Custom(other.to_string()),
        }
    }
}

/// Per-template recurrence configuration. Stored as a JSON column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceConfig {
    /// Target weekday for weekly templates, 0=Sunday..6=Saturday.
    /// Defaults to Monday.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u32>,
    /// Target calendar day for monthly templates, 1..=31, clamped to the
    /// length of the target month.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    /// Time of day stamped onto every generated instant. Defaults to 09:00.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<NaiveTime>,
}

impl RecurrenceConfig {
    /// Validate field ranges. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(dow) = self.day_of_week {
            if dow > 6 {
                return Err(format!("day_of_week must be 0..=6 (0=Sunday), got {}", dow));
            }
        }
        if let Some(dom) = self.day_of_month {
            if !(1..=31).contains(&dom) {
                return Err(format!("day_of_month must be 1..=31, got {}", dom));
            }
        }
        Ok(())
    }
}

/// A reusable definition from which task instances are periodically stamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringTemplate {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub estimated_hours: Option<f64>,
    pub project_id: String,
    pub pattern: RecurrencePattern,
    pub config: RecurrenceConfig,
    /// Deactivated templates halt generation without discarding history.
    pub active: bool,
    pub last_generated_at: Option<i64>,
    /// Always derivable from (last_generated_at or created_at, pattern,
    /// config) via `recurrence::compute_next_generation`.
    pub next_generation_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A generation failure for one template, isolated from the rest of the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub template_id: String,
    pub reason: String,
}

/// Outcome of a generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generated: Vec<Task>,
    pub failures: Vec<GenerationFailure>,
}

impl GenerationReport {
    pub fn generated_count(&self) -> usize {
        self.generated.len()
    }
}
