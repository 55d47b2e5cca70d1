use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use practice_core::model::{CoachRow, CoachView, ProblemSet, Question, QuestionId, SetId};
use storage::keys;

use crate::persist::StateStore;

//
// ─── WRITE COALESCING ──────────────────────────────────────────────────────────
//

/// Single pending-write flag with a delay.
///
/// Scheduling while a write is pending does not move its deadline, so at most
/// one write happens per window however often state changes.
#[derive(Debug, Clone)]
pub struct WriteCoalescer {
    delay: Duration,
    due_at: Option<DateTime<Utc>>,
}

impl WriteCoalescer {
    #[must_use]
    pub fn new(delay_ms: i64) -> Self {
        Self {
            delay: Duration::milliseconds(delay_ms.max(0)),
            due_at: None,
        }
    }

    /// Returns true if this call opened a new pending write.
    pub fn schedule(&mut self, now: DateTime<Utc>) -> bool {
        if self.due_at.is_some() {
            return false;
        }
        self.due_at = Some(now + self.delay);
        true
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    /// Claims the pending write if its deadline has passed.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.due_at {
            Some(due) if now >= due => {
                self.due_at = None;
                true
            }
            _ => false,
        }
    }

    /// Claims the pending write regardless of its deadline.
    pub fn take_pending(&mut self) -> bool {
        self.due_at.take().is_some()
    }
}

//
// ─── COACH STATE ───────────────────────────────────────────────────────────────
//

/// Coaching rows of every question in a set, persisted through a coalesced write.
#[derive(Debug, Clone)]
pub struct CoachStateMachine {
    set_id: SetId,
    rows: BTreeMap<QuestionId, CoachRow>,
    writes: WriteCoalescer,
}

impl CoachStateMachine {
    pub async fn load(store: &StateStore, set_id: SetId, write_delay_ms: i64) -> Self {
        let rows = store
            .load_json::<BTreeMap<QuestionId, CoachRow>>(&keys::coach_state(&set_id))
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|(id, row)| (id, row.sanitized()))
            .collect();
        Self {
            set_id,
            rows,
            writes: WriteCoalescer::new(write_delay_ms),
        }
    }

    #[must_use]
    pub fn row(&self, question_id: &QuestionId) -> Option<&CoachRow> {
        self.rows.get(question_id)
    }

    #[must_use]
    pub fn has_pending_write(&self) -> bool {
        self.writes.is_pending()
    }

    fn row_mut(&mut self, question_id: &QuestionId) -> &mut CoachRow {
        self.rows.entry(question_id.clone()).or_default()
    }

    /// Records first interaction at solve time `elapsed_ms`.
    pub fn touch(&mut self, question_id: &QuestionId, elapsed_ms: i64, now: DateTime<Utc>) -> bool {
        let touched = self.row_mut(question_id).touch(elapsed_ms);
        if touched {
            self.writes.schedule(now);
        }
        touched
    }

    /// One ticker pass over every question of `set`. Returns whether any row moved.
    pub fn advance_all(&mut self, set: &ProblemSet, elapsed_ms: i64, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for (index, question) in set.questions().iter().enumerate() {
            let recommended_ms = set.question_recommended_ms(index);
            changed |= self
                .row_mut(question.id())
                .advance(question, elapsed_ms, recommended_ms);
        }
        if changed {
            self.writes.schedule(now);
        }
        changed
    }

    pub fn apply_grade(&mut self, question: &Question, is_correct: bool, now: DateTime<Utc>) {
        self.row_mut(question.id()).apply_grade(question, is_correct);
        self.writes.schedule(now);
    }

    /// Flips the explanation panel when the explanation is available.
    pub fn toggle_explanation(&mut self, question: &Question, now: DateTime<Utc>) -> Option<bool> {
        let row = self.rows.get_mut(question.id())?;
        if !row.explain_unlocked() || question.explanation().is_none() {
            return None;
        }
        let open = row.toggle_explanation();
        self.writes.schedule(now);
        Some(open)
    }

    #[must_use]
    pub fn view(&self, set: &ProblemSet, question_id: &QuestionId, elapsed_ms: i64) -> Option<CoachView> {
        let (index, question) = set.question(question_id)?;
        let default_row = CoachRow::default();
        let row = self.rows.get(question_id).unwrap_or(&default_row);
        Some(CoachView::of(
            row,
            question,
            elapsed_ms,
            set.question_recommended_ms(index),
        ))
    }

    /// Writes the rows if the coalescing window has closed.
    pub async fn flush_due(&mut self, store: &StateStore, now: DateTime<Utc>) {
        if self.writes.take_due(now) {
            self.save(store).await;
        }
    }

    /// Writes any pending change immediately.
    pub async fn flush(&mut self, store: &StateStore) {
        if self.writes.take_pending() {
            self.save(store).await;
        }
    }

    async fn save(&self, store: &StateStore) {
        store.save_json(&keys::coach_state(&self.set_id), &self.rows).await;
    }
}

//
// ─── TIME-BOX ──────────────────────────────────────────────────────────────────
//

/// Raised once per day when total solve time crosses the set's recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeboxPrompt {
    pub recommended_ms: i64,
    pub elapsed_ms: i64,
}

/// Learner's answer to the time-box prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeboxChoice {
    Continue,
    RequestHelp,
}

/// Tracks whether today's time-box prompt was already raised.
#[derive(Debug, Clone, Default)]
pub struct TimeboxGate {
    known_day: Option<NaiveDate>,
    shown: bool,
    open: bool,
}

impl TimeboxGate {
    /// True when the persisted flag for `today` has not been read yet.
    #[must_use]
    pub fn needs_lookup(&self, today: NaiveDate) -> bool {
        self.known_day != Some(today)
    }

    pub fn remember(&mut self, today: NaiveDate, shown: bool) {
        self.known_day = Some(today);
        self.shown = shown;
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Raises the prompt if due. The caller persists the day flag.
    pub fn check(&mut self, today: NaiveDate, elapsed_ms: i64, recommended_ms: i64) -> Option<TimeboxPrompt> {
        if self.known_day != Some(today) || self.shown || elapsed_ms < recommended_ms {
            return None;
        }
        self.shown = true;
        self.open = true;
        Some(TimeboxPrompt {
            recommended_ms,
            elapsed_ms,
        })
    }

    /// Closes the prompt. Returns false if none was open.
    pub fn resolve(&mut self) -> bool {
        std::mem::take(&mut self.open)
    }
}
