use thiserror::Error;

use crate::model::{ProblemSetError, QuestionError};

/// Failure to turn authored problem-set data into domain types.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("question {id}: {source}")]
    Question {
        id: String,
        #[source]
        source: QuestionError,
    },

    #[error("question {id}: unknown type {kind:?}")]
    UnknownQuestionType { id: String, kind: String },

    #[error(transparent)]
    ProblemSet(#[from] ProblemSetError),
}

impl Error {
    /// Adapter for `map_err` that tags a `QuestionError` with its question id.
    pub fn for_question(id: impl Into<String>) -> impl FnOnce(QuestionError) -> Self {
        let id = id.into();
        move |source| Error::Question { id, source }
    }
}
