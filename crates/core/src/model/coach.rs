use serde::{Deserialize, Serialize};

use crate::model::question::Question;

/// Extra time past the recommendation before the second hint opens.
pub const HINT_TWO_OFFSET_MS: i64 = 120_000;

/// Extra time past the recommendation before the explanation unlocks.
pub const EXPLANATION_OFFSET_MS: i64 = 240_000;

/// Wrong grades that force the explanation open.
pub const MAX_WRONG_GRADES: u8 = 2;

/// Highest hint stage.
pub const MAX_STAGE: u8 = 2;

/// Per-question coaching state in classroom mode.
///
/// `stage` and `explain_unlocked` only ever move forward. `solved` mirrors the
/// last grading outcome and can flip either way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachRow {
    /// Solve-timer elapsed value at first interaction.
    #[serde(default)]
    touched_at: Option<i64>,
    #[serde(default)]
    stage: u8,
    #[serde(default)]
    wrong_grades: u8,
    #[serde(default)]
    explain_unlocked: bool,
    #[serde(default)]
    solved: bool,
    #[serde(default)]
    explain_open: bool,
}

impl CoachRow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamps counters restored from persistence into their valid ranges.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.stage = self.stage.min(MAX_STAGE);
        self.wrong_grades = self.wrong_grades.min(MAX_WRONG_GRADES);
        self
    }

    #[must_use]
    pub fn touched_at(&self) -> Option<i64> {
        self.touched_at
    }

    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.touched_at.is_some()
    }

    #[must_use]
    pub fn stage(&self) -> u8 {
        self.stage
    }

    #[must_use]
    pub fn wrong_grades(&self) -> u8 {
        self.wrong_grades
    }

    #[must_use]
    pub fn explain_unlocked(&self) -> bool {
        self.explain_unlocked
    }

    #[must_use]
    pub fn solved(&self) -> bool {
        self.solved
    }

    #[must_use]
    pub fn explain_open(&self) -> bool {
        self.explain_open
    }

    /// Marks first interaction at `elapsed_ms`. Returns false if already touched.
    pub fn touch(&mut self, elapsed_ms: i64) -> bool {
        if self.touched_at.is_some() {
            return false;
        }
        self.touched_at = Some(elapsed_ms.max(0));
        true
    }

    /// Time spent on the question since first interaction; zero while untouched.
    #[must_use]
    pub fn spent_ms(&self, elapsed_now_ms: i64) -> i64 {
        self.touched_at
            .map_or(0, |touched| (elapsed_now_ms - touched).max(0))
    }

    /// Applies the elapsed-time thresholds. Returns whether anything changed.
    ///
    /// Solved and untouched rows are left alone.
    pub fn advance(&mut self, question: &Question, elapsed_now_ms: i64, recommended_ms: i64) -> bool {
        if self.solved || !self.is_touched() {
            return false;
        }
        let before = self.clone();
        let spent = self.spent_ms(elapsed_now_ms);

        if question.hint(1).is_some() && spent >= recommended_ms {
            self.raise_stage(1);
        }
        if question.hint(2).is_some() && spent >= recommended_ms + HINT_TWO_OFFSET_MS {
            self.raise_stage(2);
        }
        if question.explanation().is_some() && spent >= recommended_ms + EXPLANATION_OFFSET_MS {
            self.explain_unlocked = true;
        }
        *self != before
    }

    /// Folds a grading verdict into the row.
    pub fn apply_grade(&mut self, question: &Question, is_correct: bool) {
        self.solved = is_correct;
        if is_correct {
            return;
        }
        self.wrong_grades = self.wrong_grades.saturating_add(1).min(MAX_WRONG_GRADES);
        if self.wrong_grades >= MAX_WRONG_GRADES {
            self.explain_unlocked = true;
        }
        if question.hint(1).is_some() {
            self.raise_stage(1);
        }
    }

    /// Flips the explanation panel. Returns the new open state.
    pub fn toggle_explanation(&mut self) -> bool {
        self.explain_open = !self.explain_open;
        self.explain_open
    }

    fn raise_stage(&mut self, stage: u8) {
        self.stage = self.stage.max(stage.min(MAX_STAGE));
    }
}

/// What the coaching panel of one question should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoachView {
    pub recommended_ms: i64,
    pub spent_ms: i64,
    pub started: bool,
    pub wrong_grades: u8,
    pub over_time: bool,
    pub hint_one_visible: bool,
    pub hint_two_visible: bool,
    pub explanation_available: bool,
    pub explanation_open: bool,
    pub nudge: bool,
}

impl CoachView {
    #[must_use]
    pub fn of(row: &CoachRow, question: &Question, elapsed_now_ms: i64, recommended_ms: i64) -> Self {
        let spent = row.spent_ms(elapsed_now_ms);
        let started = row.is_touched();
        let explanation_available = row.explain_unlocked && question.explanation().is_some();
        Self {
            recommended_ms,
            spent_ms: spent,
            started,
            wrong_grades: row.wrong_grades.min(MAX_WRONG_GRADES),
            over_time: started && spent >= recommended_ms,
            hint_one_visible: question.hint(1).is_some() && row.stage >= 1,
            hint_two_visible: question.hint(2).is_some() && row.stage >= 2,
            explanation_available,
            explanation_open: explanation_available && row.explain_open,
            nudge: started && spent >= recommended_ms + EXPLANATION_OFFSET_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::QuestionId;
    use crate::model::question::QuestionKind;

    fn question(hints: &[&str], explanation: Option<&str>) -> Question {
        let q = Question::new(
            QuestionId::new("q"),
            QuestionKind::ShortAnswer {
                expected_text: Some("1".into()),
                accepted: Vec::new(),
            },
        )
        .unwrap()
        .with_hints(hints.iter().copied())
        .unwrap();
        match explanation {
            Some(text) => q.with_explanation(text),
            None => q,
        }
    }

    #[test]
    fn untouched_row_never_advances() {
        let q = question(&["h1"], Some("why"));
        let mut row = CoachRow::new();
        assert!(!row.advance(&q, 10_000_000, 60_000));
        assert_eq!(row.stage(), 0);
    }

    #[test]
    fn stages_open_at_thresholds() {
        let q = question(&["h1", "h2"], Some("why"));
        let mut row = CoachRow::new();
        row.touch(1_000);

        row.advance(&q, 1_000 + 59_999, 60_000);
        assert_eq!(row.stage(), 0);
        row.advance(&q, 1_000 + 60_000, 60_000);
        assert_eq!(row.stage(), 1);
        row.advance(&q, 1_000 + 180_000, 60_000);
        assert_eq!(row.stage(), 2);
        assert!(!row.explain_unlocked());
        row.advance(&q, 1_000 + 300_000, 60_000);
        assert!(row.explain_unlocked());
    }

    #[test]
    fn missing_hints_keep_stage_but_explanation_unlocks() {
        let q = question(&[], Some("why"));
        let mut row = CoachRow::new();
        row.touch(0);
        row.advance(&q, 60_000, 60_000);
        assert_eq!(row.stage(), 0);
        assert!(!row.explain_unlocked());
        row.advance(&q, 300_000, 60_000);
        assert_eq!(row.stage(), 0);
        assert!(row.explain_unlocked());
    }

    #[test]
    fn second_wrong_grade_unlocks_explanation() {
        let q = question(&["h1"], Some("why"));
        let mut row = CoachRow::new();
        row.apply_grade(&q, false);
        assert_eq!(row.stage(), 1);
        assert!(!row.explain_unlocked());
        row.apply_grade(&q, false);
        row.apply_grade(&q, false);
        assert_eq!(row.wrong_grades(), 2);
        assert!(row.explain_unlocked());
    }

    #[test]
    fn solved_flips_with_last_grade_and_stage_stays() {
        let q = question(&["h1", "h2"], None);
        let mut row = CoachRow::new();
        row.touch(0);
        row.advance(&q, 500_000, 60_000);
        assert_eq!(row.stage(), 2);
        row.apply_grade(&q, true);
        assert!(row.solved());
        row.apply_grade(&q, false);
        assert!(!row.solved());
        assert_eq!(row.stage(), 2);
    }

    #[test]
    fn solved_row_is_skipped_by_advance() {
        let q = question(&["h1"], None);
        let mut row = CoachRow::new();
        row.touch(0);
        row.apply_grade(&q, true);
        assert!(!row.advance(&q, 1_000_000, 60_000));
        assert_eq!(row.stage(), 0);
    }

    #[test]
    fn view_hides_locked_explanation() {
        let q = question(&["h1"], Some("why"));
        let mut row = CoachRow::new();
        row.touch(0);
        row.toggle_explanation();
        let view = CoachView::of(&row, &q, 10_000, 60_000);
        assert!(!view.explanation_open);
        assert!(!view.over_time);
        assert!(!view.nudge);

        let view = CoachView::of(&row, &q, 300_000, 60_000);
        assert!(view.over_time);
        assert!(view.nudge);
    }

    #[test]
    fn sanitized_clamps_restored_counters() {
        let row: CoachRow =
            serde_json::from_str(r#"{"touchedAt": 5, "stage": 9, "wrongGrades": 7}"#).unwrap();
        let row = row.sanitized();
        assert_eq!(row.stage(), 2);
        assert_eq!(row.wrong_grades(), 2);
        assert_eq!(row.touched_at(), Some(5));
    }
}
