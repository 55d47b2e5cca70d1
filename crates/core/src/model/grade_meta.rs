use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::QuestionId;

//
// ─── PER-SET META ──────────────────────────────────────────────────────────────
//

/// Daily grading counter for a set. Attempts reset when the calendar day changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeMeta {
    pub date: NaiveDate,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_grade_at: Option<DateTime<Utc>>,
}

impl GradeMeta {
    #[must_use]
    pub fn new(today: NaiveDate) -> Self {
        Self {
            date: today,
            attempts: 0,
            last_grade_at: None,
        }
    }

    /// Returns this meta if it belongs to `today`, else a fresh one.
    #[must_use]
    pub fn for_day(self, today: NaiveDate) -> Self {
        if self.date == today {
            self
        } else {
            Self::new(today)
        }
    }

    /// Milliseconds left before the next grading action is allowed.
    #[must_use]
    pub fn cooldown_remaining_ms(&self, now: DateTime<Utc>, cooldown_ms: i64) -> i64 {
        let Some(last) = self.last_grade_at else {
            return 0;
        };
        let elapsed = (now - last).num_milliseconds();
        (cooldown_ms - elapsed).clamp(0, cooldown_ms.max(0))
    }

    /// Counts one executed grading action.
    ///
    /// `start_cooldown` stamps `last_grade_at`; free practice leaves it untouched.
    pub fn record_action(&mut self, now: DateTime<Utc>, today: NaiveDate, start_cooldown: bool) {
        if self.date != today {
            *self = Self::new(today);
        }
        self.attempts = self.attempts.saturating_add(1);
        if start_cooldown {
            self.last_grade_at = Some(now);
        }
    }
}

//
// ─── PER-QUESTION META ─────────────────────────────────────────────────────────
//

/// Grading history of one question for the current day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGradeMeta {
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub correct: u32,
    #[serde(default)]
    pub last_is_correct: Option<bool>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_at: Option<DateTime<Utc>>,
}

impl QuestionGradeMeta {
    /// Records a verdict. Returns whether it counted as a new attempt.
    ///
    /// Re-grading an answer that was already correct only refreshes `last_at`.
    pub fn record(&mut self, is_correct: bool, now: DateTime<Utc>) -> bool {
        self.last_at = Some(now);
        if self.last_is_correct == Some(true) && is_correct {
            return false;
        }
        self.attempts = self.attempts.saturating_add(1);
        if is_correct {
            self.correct = self.correct.saturating_add(1);
        }
        self.last_is_correct = Some(is_correct);
        true
    }
}

/// A question with the most grading attempts, as reported to the teacher console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopTry {
    pub qid: QuestionId,
    pub attempts: u32,
    pub last_is_correct: Option<bool>,
}

/// Per-question grade meta for a set, scoped to one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGradeBook {
    pub date: NaiveDate,
    #[serde(default, rename = "byQ")]
    by_question: BTreeMap<QuestionId, QuestionGradeMeta>,
}

impl QuestionGradeBook {
    #[must_use]
    pub fn new(today: NaiveDate) -> Self {
        Self {
            date: today,
            by_question: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn for_day(self, today: NaiveDate) -> Self {
        if self.date == today {
            self
        } else {
            Self::new(today)
        }
    }

    /// Records a verdict for `question_id`, rolling the book over on a new day.
    pub fn record(
        &mut self,
        question_id: &QuestionId,
        is_correct: bool,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> bool {
        if self.date != today {
            *self = Self::new(today);
        }
        self.by_question
            .entry(question_id.clone())
            .or_default()
            .record(is_correct, now)
    }

    #[must_use]
    pub fn get(&self, question_id: &QuestionId) -> Option<&QuestionGradeMeta> {
        self.by_question.get(question_id)
    }

    #[must_use]
    pub fn last_is_correct(&self, question_id: &QuestionId) -> bool {
        self.get(question_id)
            .and_then(|m| m.last_is_correct)
            .unwrap_or(false)
    }

    /// Up to `limit` questions with attempts, most attempts first.
    ///
    /// Ties keep the order of `question_ids`.
    pub fn top_tries<'a, I>(&self, question_ids: I, limit: usize) -> Vec<TopTry>
    where
        I: IntoIterator<Item = &'a QuestionId>,
    {
        let mut rows: Vec<TopTry> = question_ids
            .into_iter()
            .filter_map(|qid| {
                let meta = self.by_question.get(qid)?;
                (meta.attempts > 0).then(|| TopTry {
                    qid: qid.clone(),
                    attempts: meta.attempts,
                    last_is_correct: meta.last_is_correct,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.attempts.cmp(&a.attempts));
        rows.truncate(limit);
        rows
    }
}
