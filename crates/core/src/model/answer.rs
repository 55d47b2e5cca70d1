use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ids::QuestionId;
use crate::model::question::{Question, QuestionType};

/// A learner's current input for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Selected option of a multiple choice question.
    Choice(usize),
    /// Free text of a short answer or code question.
    Text(String),
}

impl AnswerValue {
    /// String form used by the comparators; a choice renders as its index.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            AnswerValue::Choice(index) => Cow::Owned(index.to_string()),
            AnswerValue::Text(text) => Cow::Borrowed(text),
        }
    }
}

impl From<usize> for AnswerValue {
    fn from(value: usize) -> Self {
        AnswerValue::Choice(value)
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        AnswerValue::Text(value.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(value: String) -> Self {
        AnswerValue::Text(value)
    }
}

/// Whether `value` counts as an answer for `question`.
///
/// Text must be non-blank after trimming; a multiple choice question accepts
/// any defined, non-empty value, including index zero.
#[must_use]
pub fn is_answered(question: &Question, value: Option<&AnswerValue>) -> bool {
    let Some(value) = value else {
        return false;
    };
    match question.question_type() {
        QuestionType::MultipleChoice => !value.as_text().is_empty(),
        QuestionType::ShortAnswer | QuestionType::Code => !value.as_text().trim().is_empty(),
    }
}

/// Answer map for one (student, set) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSheet {
    values: BTreeMap<QuestionId, AnswerValue>,
}

impl AnswerSheet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the previous one.
    pub fn record(&mut self, question_id: QuestionId, value: AnswerValue) -> Option<AnswerValue> {
        self.values.insert(question_id, value)
    }

    #[must_use]
    pub fn get(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.values.get(question_id)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &AnswerValue)> {
        self.values.iter()
    }
}
