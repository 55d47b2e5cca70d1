use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question id cannot be empty")]
    EmptyId,

    #[error("multiple choice question has no options")]
    NoOptions,

    #[error("correct index {index} is out of range for {len} options")]
    CorrectIndexOutOfRange { index: usize, len: usize },

    #[error("short answer question has no expected text")]
    NoExpectedText,

    #[error("code question has no accepted code")]
    NoAcceptedCode,

    #[error("a question carries at most {max} hints, got {len}")]
    TooManyHints { max: usize, len: usize },

    #[error("recommended seconds must be > 0")]
    InvalidRecommendedSeconds,
}

//
// ─── KIND ──────────────────────────────────────────────────────────────────────
//

/// Maximum number of staged hints per question.
pub const MAX_HINTS: usize = 2;

/// Discriminant of a question, as it appears in persisted sets and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "mcq")]
    MultipleChoice,
    #[serde(rename = "short")]
    ShortAnswer,
    #[serde(rename = "code")]
    Code,
}

impl QuestionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "mcq",
            QuestionType::ShortAnswer => "short",
            QuestionType::Code => "code",
        }
    }
}

/// Type-specific grading key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    /// Pick one option; graded by index.
    MultipleChoice {
        options: Vec<String>,
        correct_index: usize,
    },
    /// Write the program output; graded after whitespace and case folding.
    ShortAnswer {
        expected_text: Option<String>,
        accepted: Vec<String>,
    },
    /// Write a code fragment; graded after comment and whitespace normalization.
    Code { accepted: Vec<String> },
}

impl QuestionKind {
    #[must_use]
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionKind::MultipleChoice { .. } => QuestionType::MultipleChoice,
            QuestionKind::ShortAnswer { .. } => QuestionType::ShortAnswer,
            QuestionKind::Code { .. } => QuestionType::Code,
        }
    }

    /// Whether some answer can ever be graded correct against this key.
    #[must_use]
    pub fn is_gradable(&self) -> bool {
        self.validate().is_ok()
    }

    fn validate(&self) -> Result<(), QuestionError> {
        match self {
            QuestionKind::MultipleChoice {
                options,
                correct_index,
            } => {
                if options.is_empty() {
                    return Err(QuestionError::NoOptions);
                }
                if *correct_index >= options.len() {
                    return Err(QuestionError::CorrectIndexOutOfRange {
                        index: *correct_index,
                        len: options.len(),
                    });
                }
            }
            QuestionKind::ShortAnswer {
                expected_text,
                accepted,
            } => {
                let has_text = expected_text.as_deref().is_some_and(|t| !t.trim().is_empty());
                let has_alt = accepted.iter().any(|t| !t.trim().is_empty());
                if !has_text && !has_alt {
                    return Err(QuestionError::NoExpectedText);
                }
            }
            QuestionKind::Code { accepted } => {
                if !accepted.iter().any(|c| !c.trim().is_empty()) {
                    return Err(QuestionError::NoAcceptedCode);
                }
            }
        }
        Ok(())
    }
}

//
// ─── BUCKET ────────────────────────────────────────────────────────────────────
//

/// Classroom split of a set: core questions first, supplemental ones in a second view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    #[default]
    #[serde(rename = "core")]
    Core,
    #[serde(rename = "supp")]
    Supplemental,
}

impl Bucket {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Core => "core",
            Bucket::Supplemental => "supp",
        }
    }

    /// Parses the persisted tag; anything else is treated as untagged.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "core" => Some(Bucket::Core),
            "supp" => Some(Bucket::Supplemental),
            _ => None,
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single question of a problem set. Immutable once the set is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    kind: QuestionKind,
    title: Option<String>,
    description: Option<String>,
    snippet: Option<String>,
    hints: Vec<String>,
    explanation: Option<String>,
    recommended_secs: Option<u32>,
    bucket: Option<Bucket>,
}

impl Question {
    /// Creates a question without hints, explanation, or overrides.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the id is blank or the grading key is unusable.
    pub fn new(id: QuestionId, kind: QuestionKind) -> Result<Self, QuestionError> {
        kind.validate()?;
        Self::authored(id, kind)
    }

    /// Creates a question as authored, keeping an unusable grading key.
    ///
    /// Such a question loads and renders, but no answer grades correct.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyId` if the id is blank.
    pub fn authored(id: QuestionId, kind: QuestionKind) -> Result<Self, QuestionError> {
        if id.as_str().trim().is_empty() {
            return Err(QuestionError::EmptyId);
        }
        Ok(Self {
            id,
            kind,
            title: None,
            description: None,
            snippet: None,
            hints: Vec::new(),
            explanation: None,
            recommended_secs: None,
            bucket: None,
        })
    }

    /// Attach the prompt shown to the learner. Blank parts are dropped.
    #[must_use]
    pub fn with_prompt(
        mut self,
        title: Option<String>,
        description: Option<String>,
        snippet: Option<String>,
    ) -> Self {
        let keep = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        self.title = keep(title);
        self.description = keep(description);
        self.snippet = keep(snippet);
        self
    }

    /// Attach staged hints. Blank hints are dropped.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::TooManyHints` if more than two non-blank hints remain.
    pub fn with_hints<I, S>(mut self, hints: I) -> Result<Self, QuestionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hints: Vec<String> = hints
            .into_iter()
            .map(Into::into)
            .filter(|h| !h.trim().is_empty())
            .collect();
        if hints.len() > MAX_HINTS {
            return Err(QuestionError::TooManyHints {
                max: MAX_HINTS,
                len: hints.len(),
            });
        }
        self.hints = hints;
        Ok(self)
    }

    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        let explanation = explanation.into();
        self.explanation = (!explanation.trim().is_empty()).then_some(explanation);
        self
    }

    /// Override the per-question recommended duration.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidRecommendedSeconds` for zero.
    pub fn with_recommended_secs(mut self, secs: u32) -> Result<Self, QuestionError> {
        if secs == 0 {
            return Err(QuestionError::InvalidRecommendedSeconds);
        }
        self.recommended_secs = Some(secs);
        Ok(self)
    }

    #[must_use]
    pub fn with_bucket(mut self, bucket: Bucket) -> Self {
        self.bucket = Some(bucket);
        self
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> &QuestionKind {
        &self.kind
    }

    #[must_use]
    pub fn question_type(&self) -> QuestionType {
        self.kind.question_type()
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Code shown with the question, if any.
    #[must_use]
    pub fn snippet(&self) -> Option<&str> {
        self.snippet.as_deref()
    }

    #[must_use]
    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    #[must_use]
    pub fn hint(&self, stage: u8) -> Option<&str> {
        match stage {
            1 | 2 => self.hints.get(usize::from(stage) - 1).map(String::as_str),
            _ => None,
        }
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn recommended_secs(&self) -> Option<u32> {
        self.recommended_secs
    }

    #[must_use]
    pub fn bucket(&self) -> Option<Bucket> {
        self.bucket
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq(correct_index: usize) -> QuestionKind {
        QuestionKind::MultipleChoice {
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_index,
        }
    }

    #[test]
    fn rejects_out_of_range_correct_index() {
        let err = Question::new(QuestionId::new("q1"), mcq(3)).unwrap_err();
        assert_eq!(
            err,
            QuestionError::CorrectIndexOutOfRange { index: 3, len: 3 }
        );
    }

    #[test]
    fn rejects_short_answer_without_any_expectation() {
        let kind = QuestionKind::ShortAnswer {
            expected_text: Some("  ".into()),
            accepted: vec![String::new()],
        };
        let err = Question::new(QuestionId::new("q1"), kind).unwrap_err();
        assert_eq!(err, QuestionError::NoExpectedText);
    }

    #[test]
    fn authored_keeps_unusable_keys() {
        let q = Question::authored(QuestionId::new("q1"), mcq(usize::MAX)).unwrap();
        assert!(!q.kind().is_gradable());
        let code = QuestionKind::Code { accepted: Vec::new() };
        assert!(!Question::authored(QuestionId::new("q2"), code).unwrap().kind().is_gradable());
        assert!(mcq(2).is_gradable());

        let err = Question::authored(QuestionId::new(" "), mcq(0)).unwrap_err();
        assert_eq!(err, QuestionError::EmptyId);
    }

    #[test]
    fn drops_blank_hints_and_caps_at_two() {
        let q = Question::new(QuestionId::new("q1"), mcq(0))
            .unwrap()
            .with_hints(["first", "", "second"])
            .unwrap();
        assert_eq!(q.hint(1), Some("first"));
        assert_eq!(q.hint(2), Some("second"));
        assert_eq!(q.hint(3), None);

        let err = Question::new(QuestionId::new("q2"), mcq(0))
            .unwrap()
            .with_hints(["a", "b", "c"])
            .unwrap_err();
        assert!(matches!(err, QuestionError::TooManyHints { len: 3, .. }));
    }

    #[test]
    fn blank_explanation_is_absent() {
        let q = Question::new(QuestionId::new("q1"), mcq(1))
            .unwrap()
            .with_explanation("   ");
        assert_eq!(q.explanation(), None);
    }

    #[test]
    fn bucket_tags_round_trip() {
        assert_eq!(Bucket::from_tag("supp"), Some(Bucket::Supplemental));
        assert_eq!(Bucket::from_tag("other"), None);
        assert_eq!(Bucket::Core.as_str(), "core");
    }
}
