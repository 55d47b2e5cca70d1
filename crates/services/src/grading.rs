use chrono::{DateTime, NaiveDate, Utc};
use practice_core::model::{
    GradeMeta, Question, QuestionGradeBook, QuestionId, QuestionType, SetId, TopTry,
};
use storage::keys;
use tracing::debug;

use crate::error::GradeError;
use crate::persist::StateStore;

/// Verdict for one graded question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionVerdict {
    pub question_id: QuestionId,
    pub question_type: QuestionType,
    pub is_correct: bool,
}

/// Outcome of one executed grading action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeReport {
    pub verdicts: Vec<QuestionVerdict>,
    pub correct: usize,
    pub total: usize,
    /// Grading actions executed today, including this one.
    pub attempts_today: u32,
}

/// Attempt counters and the cooldown gate of a set.
///
/// The comparator itself lives in `practice_core::grading`.
#[derive(Debug, Clone)]
pub struct GradeEngine {
    set_id: SetId,
    cooldown_ms: i64,
    meta: GradeMeta,
    book: QuestionGradeBook,
}

impl GradeEngine {
    /// Restore today's counters; stale or corrupt data starts fresh.
    pub async fn load(store: &StateStore, set_id: SetId, cooldown_ms: i64, today: NaiveDate) -> Self {
        let meta = store
            .load_json::<GradeMeta>(&keys::grade_meta(&set_id))
            .await
            .map_or_else(|| GradeMeta::new(today), |meta| meta.for_day(today));
        let book = store
            .load_json::<QuestionGradeBook>(&keys::question_grade_meta(&set_id))
            .await
            .map_or_else(|| QuestionGradeBook::new(today), |book| book.for_day(today));
        Self {
            set_id,
            cooldown_ms,
            meta,
            book,
        }
    }

    #[must_use]
    pub fn meta(&self) -> &GradeMeta {
        &self.meta
    }

    #[must_use]
    pub fn book(&self) -> &QuestionGradeBook {
        &self.book
    }

    /// Attempts recorded today as seen at `today`.
    #[must_use]
    pub fn attempts_today(&self, today: NaiveDate) -> u32 {
        if self.meta.date == today {
            self.meta.attempts
        } else {
            0
        }
    }

    #[must_use]
    pub fn cooldown_remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        self.meta.cooldown_remaining_ms(now, self.cooldown_ms)
    }

    /// Rejects a classroom grading action inside the cooldown window.
    ///
    /// # Errors
    ///
    /// Returns `GradeError::CooldownActive` with the time left.
    pub fn check_cooldown(&self, now: DateTime<Utc>, classroom: bool) -> Result<(), GradeError> {
        if !classroom {
            return Ok(());
        }
        let remaining_ms = self.cooldown_remaining_ms(now);
        if remaining_ms > 0 {
            debug!(set = %self.set_id, remaining_ms, "grading rejected by cooldown");
            return Err(GradeError::CooldownActive { remaining_ms });
        }
        Ok(())
    }

    /// Folds one verdict into the per-question book.
    pub fn record_verdict(
        &mut self,
        question: &Question,
        is_correct: bool,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> bool {
        self.book.record(question.id(), is_correct, now, today)
    }

    /// Counts one executed grading action and persists both metas.
    pub async fn finish_action(
        &mut self,
        store: &StateStore,
        now: DateTime<Utc>,
        today: NaiveDate,
        classroom: bool,
    ) -> u32 {
        self.meta.record_action(now, today, classroom);
        store.save_json(&keys::grade_meta(&self.set_id), &self.meta).await;
        store
            .save_json(&keys::question_grade_meta(&self.set_id), &self.book)
            .await;
        self.meta.attempts
    }

    #[must_use]
    pub fn top_tries<'a, I>(&self, question_ids: I, limit: usize) -> Vec<TopTry>
    where
        I: IntoIterator<Item = &'a QuestionId>,
    {
        self.book.top_tries(question_ids, limit)
    }

    /// Forget all counters and remove them from persistence.
    pub async fn reset(&mut self, store: &StateStore, today: NaiveDate) {
        self.meta = GradeMeta::new(today);
        self.book = QuestionGradeBook::new(today);
        store.remove(&keys::question_grade_meta(&self.set_id)).await;
        store.remove(&keys::grade_meta(&self.set_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use practice_core::model::QuestionKind;
    use practice_core::time::{calendar_day, fixed_now};
    use std::sync::Arc;
    use storage::repository::InMemoryRepository;

    fn store() -> StateStore {
        StateStore::new(Arc::new(InMemoryRepository::new()))
    }

    fn question() -> Question {
        Question::new(
            QuestionId::new("q"),
            QuestionKind::ShortAnswer {
                expected_text: Some("1".into()),
                accepted: Vec::new(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn cooldown_gates_only_classroom() {
        let store = store();
        let now = fixed_now();
        let today = calendar_day(now);
        let mut engine = GradeEngine::load(&store, SetId::new("s"), 20_000, today).await;

        engine.finish_action(&store, now, today, true).await;
        let later = now + Duration::seconds(5);
        assert_eq!(
            engine.check_cooldown(later, true),
            Err(GradeError::CooldownActive { remaining_ms: 15_000 })
        );
        assert_eq!(engine.check_cooldown(later, false), Ok(()));
        assert_eq!(engine.check_cooldown(now + Duration::seconds(20), true), Ok(()));
    }

    #[tokio::test]
    async fn counters_persist_and_reset() {
        let store = store();
        let now = fixed_now();
        let today = calendar_day(now);
        let set = SetId::new("s");

        let mut engine = GradeEngine::load(&store, set.clone(), 20_000, today).await;
        engine.record_verdict(&question(), false, now, today);
        assert_eq!(engine.finish_action(&store, now, today, false).await, 1);

        let mut reloaded = GradeEngine::load(&store, set.clone(), 20_000, today).await;
        assert_eq!(reloaded.attempts_today(today), 1);
        assert_eq!(reloaded.book().get(&QuestionId::new("q")).map(|m| m.attempts), Some(1));

        reloaded.reset(&store, today).await;
        let fresh = GradeEngine::load(&store, set, 20_000, today).await;
        assert_eq!(fresh.attempts_today(today), 0);
        assert!(fresh.book().get(&QuestionId::new("q")).is_none());
    }
}
