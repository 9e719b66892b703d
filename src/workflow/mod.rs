pub mod engine;
pub mod notify;

pub use engine::*;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::enums::{BillingStatus, TestStatus};
use crate::report::ReportError;

/// Workflow failure taxonomy. Deterministic variants carry enough
/// context for the caller to self-correct; `Database` is logged and
/// surfaced generically.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("invalid transition: requires {required} (current status: {current}, billing: {billing})")]
    InvalidTransition {
        required: String,
        current: TestStatus,
        billing: BillingStatus,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Database(DatabaseError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

impl From<DatabaseError> for WorkflowError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => WorkflowError::NotFound {
                entity: entity_type,
                id,
            },
            DatabaseError::StaleVersion { entity_type, id } => WorkflowError::Conflict(format!(
                "concurrent update on {entity_type} {id}, re-read and retry"
            )),
            other => WorkflowError::Database(other),
        }
    }
}
