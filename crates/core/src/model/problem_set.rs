use std::collections::HashSet;

use thiserror::Error;

use crate::model::ids::{QuestionId, SetId};
use crate::model::question::{Bucket, Question};

/// Recommended duration for a set that does not declare one.
pub const DEFAULT_RECOMMENDED_MINUTES: u32 = 15;

/// Number of leading questions treated as core when a question is untagged.
pub const DEFAULT_CORE_COUNT: usize = 6;

/// Lower bound of the derived per-question recommended duration.
pub const MIN_QUESTION_RECOMMENDED_MS: i64 = 90_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProblemSetError {
    #[error("problem set has no questions")]
    Empty,

    #[error("duplicate question id: {0}")]
    DuplicateQuestionId(QuestionId),

    #[error("recommended minutes must be > 0")]
    InvalidRecommendedMinutes,
}

/// A loaded set of questions with its classroom timing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemSet {
    id: SetId,
    title: String,
    category_id: Option<String>,
    languages: Vec<String>,
    recommended_minutes: u32,
    core_count: usize,
    questions: Vec<Question>,
}

impl ProblemSet {
    /// Creates a problem set with default timing.
    ///
    /// # Errors
    ///
    /// Returns `ProblemSetError::Empty` for an empty question list and
    /// `ProblemSetError::DuplicateQuestionId` if two questions share an id.
    pub fn new(
        id: SetId,
        title: impl Into<String>,
        questions: Vec<Question>,
    ) -> Result<Self, ProblemSetError> {
        if questions.is_empty() {
            return Err(ProblemSetError::Empty);
        }
        let mut seen = HashSet::with_capacity(questions.len());
        for q in &questions {
            if !seen.insert(q.id()) {
                return Err(ProblemSetError::DuplicateQuestionId(q.id().clone()));
            }
        }

        Ok(Self {
            id,
            title: title.into(),
            category_id: None,
            languages: vec!["c".to_string()],
            recommended_minutes: DEFAULT_RECOMMENDED_MINUTES,
            core_count: DEFAULT_CORE_COUNT,
            questions,
        })
    }

    #[must_use]
    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    /// Replace the available languages; an empty list keeps the current one.
    #[must_use]
    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        if !languages.is_empty() {
            self.languages = languages;
        }
        self
    }

    /// # Errors
    ///
    /// Returns `ProblemSetError::InvalidRecommendedMinutes` for zero.
    pub fn with_recommended_minutes(mut self, minutes: u32) -> Result<Self, ProblemSetError> {
        if minutes == 0 {
            return Err(ProblemSetError::InvalidRecommendedMinutes);
        }
        self.recommended_minutes = minutes;
        Ok(self)
    }

    #[must_use]
    pub fn with_core_count(mut self, core_count: usize) -> Self {
        self.core_count = core_count;
        self
    }

    #[must_use]
    pub fn id(&self) -> &SetId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn category_id(&self) -> Option<&str> {
        self.category_id.as_deref()
    }

    #[must_use]
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// First available language, used as the session language.
    #[must_use]
    pub fn primary_language(&self) -> &str {
        self.languages.first().map_or("c", String::as_str)
    }

    #[must_use]
    pub fn core_count(&self) -> usize {
        self.core_count
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Looks up a question and its position in the set.
    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<(usize, &Question)> {
        self.questions.iter().enumerate().find(|(_, q)| q.id() == id)
    }

    /// Recommended duration for the whole set, in milliseconds.
    #[must_use]
    pub fn recommended_ms(&self) -> i64 {
        i64::from(self.recommended_minutes) * 60_000
    }

    /// Recommended duration for the question at `index`, in milliseconds.
    ///
    /// A question override wins; otherwise the set duration is split across
    /// `min(core_count, len)` questions and floored at 90 seconds.
    #[must_use]
    pub fn question_recommended_ms(&self, index: usize) -> i64 {
        if let Some(secs) = self.questions.get(index).and_then(Question::recommended_secs) {
            return i64::from(secs) * 1000;
        }
        let divisor = self.core_count.min(self.questions.len()).max(1);
        let divisor = i64::try_from(divisor).unwrap_or(i64::MAX);
        (self.recommended_ms() / divisor).max(MIN_QUESTION_RECOMMENDED_MS)
    }

    /// Bucket of the question at `index`: its explicit tag, else split at `core_count`.
    #[must_use]
    pub fn resolved_bucket(&self, index: usize) -> Bucket {
        if let Some(bucket) = self.questions.get(index).and_then(Question::bucket) {
            return bucket;
        }
        if index < self.core_count {
            Bucket::Core
        } else {
            Bucket::Supplemental
        }
    }
}
