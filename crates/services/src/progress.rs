use practice_core::model::{
    AnswerSheet, Bucket, PracticeMode, ProblemSet, QuestionGradeBook, is_answered,
};
use serde::{Deserialize, Serialize};

/// Aggregated view of session progress, useful for UI and the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub answered: usize,
    pub correct: usize,
    pub total: usize,
}

impl Progress {
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.answered == self.total
    }
}

/// Positions of the questions currently in play.
///
/// Every question in practice mode; in classroom mode only the selected bucket.
#[must_use]
pub fn active_indices(set: &ProblemSet, mode: PracticeMode, bucket: Bucket) -> Vec<usize> {
    (0..set.len())
        .filter(|&index| !mode.is_classroom() || set.resolved_bucket(index) == bucket)
        .collect()
}

/// Latest aggregate over the active questions.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    current: Progress,
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Progress {
        self.current
    }

    pub fn recompute(
        &mut self,
        set: &ProblemSet,
        indices: &[usize],
        answers: &AnswerSheet,
        book: &QuestionGradeBook,
    ) -> Progress {
        self.current = count(set, indices, answers, book);
        self.current
    }
}

/// Answered and last-graded-correct counts over `indices`.
#[must_use]
pub fn count(
    set: &ProblemSet,
    indices: &[usize],
    answers: &AnswerSheet,
    book: &QuestionGradeBook,
) -> Progress {
    let questions = set.questions();
    let mut progress = Progress::default();
    for question in indices.iter().filter_map(|&index| questions.get(index)) {
        progress.total += 1;
        if is_answered(question, answers.get(question.id())) {
            progress.answered += 1;
        }
        if book.last_is_correct(question.id()) {
            progress.correct += 1;
        }
    }
    progress
}
