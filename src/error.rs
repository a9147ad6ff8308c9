//! Error taxonomy for the engine.
//!
//! Every variant is recoverable by the caller; nothing here is fatal. The
//! `ErrorCode` mapping gives the thin CRUD layer a stable value to translate
//! into conventional not-found/conflict/validation responses.

use crate::types::PrerequisiteRef;
use serde::Serialize;
use thiserror::Error;

/// Stable error codes for programmatic handling by external callers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InvalidArgument,
    AlreadyExists,
    WouldCreateCycle,
    Blocked,
    Conflict,
    StorageError,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown task, template, project or edge.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Self-dependency, malformed recurrence config, invalid reparenting.
    #[error("{0}")]
    InvalidArgument(String),

    /// The exact ordered dependency pair already exists.
    #[error("dependency already exists: {dependent} -> {prerequisite}")]
    AlreadyExists {
        dependent: String,
        prerequisite: String,
    },

    /// The edge would close a directed cycle.
    #[error("adding dependency {dependent} -> {prerequisite} would create a cycle")]
    WouldCreateCycle {
        dependent: String,
        prerequisite: String,
    },

    /// A gated status transition was rejected. Carries the unresolved
    /// prerequisites so the caller can explain why without inspecting logs.
    #[error("task {task_id} is blocked by: {}", format_blockers(.blocking))]
    Blocked {
        task_id: String,
        blocking: Vec<PrerequisiteRef>,
    },

    /// A concurrent run claimed the template for this due cycle first.
    #[error("template {template_id} was already claimed for this cycle")]
    Conflict { template_id: String },

    #[error(transparent)]
    Storage(anyhow::Error),
}

/// Storage-layer closures run under `anyhow`; engine errors raised inside a
/// transaction are recovered here by downcast instead of being flattened
/// into storage errors.
impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<EngineError>() {
            Ok(engine_err) => engine_err,
            Err(err) => EngineError::Storage(err),
        }
    }
}

fn format_blockers(blocking: &[PrerequisiteRef]) -> String {
    blocking
        .iter()
        .map(|p| format!("{} ({})", p.title, p.id))
        .collect::<Vec<_>>()
        .join(", ")
}

impl EngineError {
    pub fn task_not_found(id: &str) -> Self {
        EngineError::NotFound {
            kind: "task",
            id: id.to_string(),
        }
    }

    pub fn template_not_found(id: &str) -> Self {
        EngineError::NotFound {
            kind: "template",
            id: id.to_string(),
        }
    }

    pub fn project_not_found(id: &str) -> Self {
        EngineError::NotFound {
            kind: "project",
            id: id.to_string(),
        }
    }

    pub fn dependency_not_found(dependent: &str, prerequisite: &str) -> Self {
        EngineError::NotFound {
            kind: "dependency",
            id: format!("{} -> {}", dependent, prerequisite),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            EngineError::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            EngineError::WouldCreateCycle { .. } => ErrorCode::WouldCreateCycle,
            EngineError::Blocked { .. } => ErrorCode::Blocked,
            EngineError::Conflict { .. } => ErrorCode::Conflict,
            EngineError::Storage(_) => ErrorCode::StorageError,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
