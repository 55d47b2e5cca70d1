//! Shared error types for the services crate.

use thiserror::Error;

use practice_core::model::{QuestionId, SetId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Reasons a grading action was not executed. Nothing is mutated in either case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum GradeError {
    #[error("grading is cooling down for another {remaining_ms} ms")]
    CooldownActive { remaining_ms: i64 },
    #[error("{suspicious} answers look like the wrong format; confirm to grade anyway")]
    NeedsConfirmation { suspicious: usize },
}

/// Errors emitted by session operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("problem set {set} could not be loaded: {source}")]
    ProblemSet {
        set: SetId,
        #[source]
        source: StorageError,
    },
    #[error("unknown question: {0}")]
    UnknownQuestion(QuestionId),
    #[error(transparent)]
    Grade(#[from] GradeError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("invalid dashboard url: {0}")]
    DashboardUrl(#[from] url::ParseError),
}
