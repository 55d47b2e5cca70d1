//! Grading log handed to external formatters.
//!
//! Holds the learner's answers and verdicts, never the expected values.

use chrono::{DateTime, Utc};
use practice_core::grading::{format_warning, grade};
use practice_core::model::{AnswerSheet, AnswerValue, GradeMeta, ProblemSet, QuestionId, QuestionType, SetId};
use serde::{Deserialize, Serialize};

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSet {
    pub id: SetId,
    pub title: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub correct: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedAnswer {
    pub id: QuestionId,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub is_correct: bool,
    pub answer: Option<AnswerValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub set: ExportedSet,
    pub lang: String,
    pub solve_elapsed_ms: i64,
    pub grade_meta: GradeMeta,
    pub score: Score,
    pub suspicious_count: usize,
    pub per_question: Vec<ExportedAnswer>,
}

impl GradingExport {
    /// Grades every question of `set` against the current answers.
    #[must_use]
    pub fn build(
        set: &ProblemSet,
        answers: &AnswerSheet,
        grade_meta: &GradeMeta,
        lang: &str,
        solve_elapsed_ms: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let per_question: Vec<ExportedAnswer> = set
            .questions()
            .iter()
            .map(|question| {
                let answer = answers.get(question.id());
                ExportedAnswer {
                    id: question.id().clone(),
                    question_type: question.question_type(),
                    is_correct: grade(question, answer),
                    answer: answer.cloned(),
                }
            })
            .collect();
        let suspicious_count = set
            .questions()
            .iter()
            .filter(|question| format_warning(question, answers.get(question.id())).is_some())
            .count();

        Self {
            version: EXPORT_VERSION,
            exported_at: now,
            set: ExportedSet {
                id: set.id().clone(),
                title: set.title().to_string(),
                category_id: set.category_id().unwrap_or_default().to_string(),
            },
            lang: lang.to_string(),
            solve_elapsed_ms,
            grade_meta: grade_meta.clone(),
            score: Score {
                correct: per_question.iter().filter(|row| row.is_correct).count(),
                total: per_question.len(),
            },
            suspicious_count,
            per_question,
        }
    }

    /// # Errors
    ///
    /// Returns the serializer error; not expected for this type.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
