//! One practice session over one problem set.
//!
//! `SessionContext` owns every stateful component of the session and is the
//! only way to mutate them. All operations read the time from the session's
//! `Clock`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use practice_core::grading::{format_warning, grade};
use practice_core::model::{
    AnswerValue, Bucket, CoachView, PracticeMode, ProblemSet, Question, QuestionId, SetId,
};
use practice_core::time::calendar_day;
use storage::keys;
use storage::repository::Storage;
use tracing::{debug, info};

use crate::Clock;
use crate::answers::AnswerStore;
use crate::coach::{CoachStateMachine, TimeboxChoice, TimeboxGate, TimeboxPrompt};
use crate::config::SessionConfig;
use crate::dashboard::{
    DashboardIdentity, DashboardSyncClient, HelpOutcome, SessionStatus, StatusSink,
};
use crate::error::{GradeError, SessionError};
use crate::export::GradingExport;
use crate::grading::{GradeEngine, GradeReport, QuestionVerdict};
use crate::persist::StateStore;
use crate::progress::{Progress, ProgressTracker, active_indices, count};
use crate::timer::{ClockDisplay, SolveTimer};

/// How a session is opened.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub set_id: SetId,
    /// Mode imposed by the page; wins over everything.
    pub forced_mode: Option<PracticeMode>,
    /// Mode asked for when nothing is persisted.
    pub requested_mode: Option<PracticeMode>,
    pub visible: bool,
}

impl SessionOptions {
    #[must_use]
    pub fn new(set_id: SetId) -> Self {
        Self {
            set_id,
            forced_mode: None,
            requested_mode: None,
            visible: true,
        }
    }

    #[must_use]
    pub fn with_forced_mode(mut self, mode: PracticeMode) -> Self {
        self.forced_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_requested_mode(mut self, mode: PracticeMode) -> Self {
        self.requested_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

pub struct SessionContext {
    config: SessionConfig,
    clock: Clock,
    store: StateStore,
    set: ProblemSet,
    mode: PracticeMode,
    bucket: Bucket,
    visible: bool,
    answers: AnswerStore,
    timer: SolveTimer,
    grading: GradeEngine,
    coach: CoachStateMachine,
    timebox: TimeboxGate,
    progress: ProgressTracker,
    dashboard: Option<DashboardSyncClient>,
}

impl SessionContext {
    /// Load the set and restore every persisted component.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ProblemSet` if the set cannot be loaded. Nothing
    /// else fails: unreadable persisted state falls back to defaults.
    pub async fn open(
        storage: &Storage,
        config: SessionConfig,
        clock: Clock,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let set = storage
            .sets
            .load_set(&options.set_id)
            .await
            .map_err(|source| SessionError::ProblemSet {
                set: options.set_id.clone(),
                source,
            })?;
        let store = StateStore::new(storage.values.clone());
        let now = clock.now();
        let today = calendar_day(now);
        let set_id = set.id().clone();

        let saved_mode = store
            .get_raw(&keys::practice_mode())
            .await
            .and_then(|raw| raw.parse::<PracticeMode>().ok());
        let mode = PracticeMode::resolve(options.forced_mode, saved_mode, options.requested_mode);
        if saved_mode != Some(mode) {
            store.set_raw(&keys::practice_mode(), mode.as_str()).await;
        }

        let answers = AnswerStore::load(&store, set_id.clone()).await;
        let saved_elapsed = store
            .get_raw(&keys::solve_time(&set_id))
            .await
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(0);
        let mut timer = SolveTimer::new(saved_elapsed);
        if options.visible {
            timer.start(now);
        }
        let grading = GradeEngine::load(&store, set_id.clone(), config.grade_cooldown_ms, today).await;
        let coach = CoachStateMachine::load(&store, set_id.clone(), config.coach_write_delay_ms).await;

        info!(set = %set_id, mode = %mode, questions = set.len(), "session opened");
        let mut session = Self {
            config,
            clock,
            store,
            set,
            mode,
            bucket: Bucket::Core,
            visible: options.visible,
            answers,
            timer,
            grading,
            coach,
            timebox: TimeboxGate::default(),
            progress: ProgressTracker::new(),
            dashboard: None,
        };
        session.recompute_progress();
        Ok(session)
    }

    /// Connect the session to a room; pushes one status right away.
    pub async fn attach_dashboard(&mut self, identity: DashboardIdentity, sink: Arc<dyn StatusSink>) {
        let client = DashboardSyncClient::open(&self.store, identity, sink, &self.config).await;
        self.dashboard = Some(client);
        self.push_status(self.now());
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn today(&self) -> NaiveDate {
        calendar_day(self.now())
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn set(&self) -> &ProblemSet {
        &self.set
    }

    #[must_use]
    pub fn mode(&self) -> PracticeMode {
        self.mode
    }

    #[must_use]
    pub fn bucket(&self) -> Bucket {
        self.bucket
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    #[must_use]
    pub fn timer(&self) -> &SolveTimer {
        &self.timer
    }

    #[must_use]
    pub fn grading(&self) -> &GradeEngine {
        &self.grading
    }

    #[must_use]
    pub fn coach(&self) -> &CoachStateMachine {
        &self.coach
    }

    #[must_use]
    pub fn dashboard(&self) -> Option<&DashboardSyncClient> {
        self.dashboard.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        self.progress.current()
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        self.timer.elapsed_now(self.now())
    }

    #[must_use]
    pub fn timebox_open(&self) -> bool {
        self.timebox.is_open()
    }

    /// Questions currently in play, in set order.
    #[must_use]
    pub fn active_questions(&self) -> Vec<&Question> {
        let questions = self.set.questions();
        self.active()
            .into_iter()
            .filter_map(|index| questions.get(index))
            .collect()
    }

    fn active(&self) -> Vec<usize> {
        active_indices(&self.set, self.mode, self.bucket)
    }

    fn question(&self, question_id: &QuestionId) -> Result<&Question, SessionError> {
        self.set
            .question(question_id)
            .map(|(_, question)| question)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.clone()))
    }

    /// Advance a fixed clock; real clocks are unaffected.
    pub fn advance_clock(&mut self, ms: i64) {
        self.clock.advance_ms(ms);
    }

    //
    // ─── ANSWERS ───────────────────────────────────────────────────────────────
    //

    /// Store an answer and report it to the room.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for an id outside the set.
    pub async fn record_answer(
        &mut self,
        question_id: &QuestionId,
        value: AnswerValue,
    ) -> Result<Progress, SessionError> {
        self.question(question_id)?;
        let now = self.now();
        self.answers
            .record(&self.store, question_id.clone(), value)
            .await;
        if self.mode.is_classroom() {
            let elapsed = self.timer.elapsed_now(now);
            self.coach.touch(question_id, elapsed, now);
        }
        let progress = self.recompute_progress();
        if let Some(dashboard) = self.dashboard.as_mut() {
            dashboard.note_input(question_id, now);
        }
        self.push_status(now);
        Ok(progress)
    }

    /// Pointer-down on a question without input.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for an id outside the set.
    pub fn touch(&mut self, question_id: &QuestionId) -> Result<bool, SessionError> {
        self.question(question_id)?;
        let now = self.now();
        self.note_activity();
        if !self.mode.is_classroom() {
            return Ok(false);
        }
        let elapsed = self.timer.elapsed_now(now);
        Ok(self.coach.touch(question_id, elapsed, now))
    }

    /// Key or pointer movement. Throttled, never pushes.
    pub fn note_activity(&mut self) {
        let now = self.now();
        if let Some(dashboard) = self.dashboard.as_mut() {
            dashboard.mark_activity(now, true);
        }
    }

    /// Clear answers, grading counters and solve time.
    pub async fn reset_answers(&mut self) {
        let now = self.now();
        let today = self.today();
        self.answers.clear(&self.store).await;
        self.grading.reset(&self.store, today).await;
        self.timer.reset(now);
        self.store.set_raw(&keys::solve_time(self.set.id()), "0").await;
        info!(set = %self.set.id(), "session reset");
        self.recompute_progress();
        self.push_status(now);
    }

    //
    // ─── GRADING ───────────────────────────────────────────────────────────────
    //

    /// Grade the active questions.
    ///
    /// # Errors
    ///
    /// `GradeError::CooldownActive` inside the classroom cooldown.
    /// `GradeError::NeedsConfirmation` when answers look like the wrong format
    /// and `acknowledge_warnings` is false. Nothing is mutated in either case.
    pub async fn grade_all(&mut self, acknowledge_warnings: bool) -> Result<GradeReport, SessionError> {
        let now = self.now();
        let result = self.grade_active(acknowledge_warnings, now).await;
        if let Some(dashboard) = self.dashboard.as_mut() {
            dashboard.mark_activity(now, false);
        }
        self.push_status(now);
        result
    }

    async fn grade_active(
        &mut self,
        acknowledge_warnings: bool,
        now: DateTime<Utc>,
    ) -> Result<GradeReport, SessionError> {
        let today = calendar_day(now);
        let classroom = self.mode.is_classroom();
        self.grading.check_cooldown(now, classroom)?;

        let active = self.active();
        let questions = self.set.questions();
        // The format check covers every question, not just the selected bucket.
        let suspicious = questions
            .iter()
            .filter(|question| format_warning(question, self.answers.get(question.id())).is_some())
            .count();
        if suspicious > 0 && !acknowledge_warnings {
            debug!(set = %self.set.id(), suspicious, "grading paused for confirmation");
            return Err(GradeError::NeedsConfirmation { suspicious }.into());
        }

        let mut verdicts = Vec::with_capacity(active.len());
        for question in active.iter().filter_map(|&index| questions.get(index)) {
            let is_correct = grade(question, self.answers.get(question.id()));
            self.grading.record_verdict(question, is_correct, now, today);
            if classroom {
                self.coach.apply_grade(question, is_correct, now);
            }
            verdicts.push(QuestionVerdict {
                question_id: question.id().clone(),
                question_type: question.question_type(),
                is_correct,
            });
        }
        let attempts_today = self
            .grading
            .finish_action(&self.store, now, today, classroom)
            .await;
        self.recompute_progress();

        let correct = verdicts.iter().filter(|v| v.is_correct).count();
        info!(set = %self.set.id(), correct, total = verdicts.len(), attempts_today, "graded");
        Ok(GradeReport {
            total: verdicts.len(),
            correct,
            verdicts,
            attempts_today,
        })
    }

    #[must_use]
    pub fn grade_cooldown_remaining_ms(&self) -> i64 {
        if self.mode.is_classroom() {
            self.grading.cooldown_remaining_ms(self.now())
        } else {
            0
        }
    }

    //
    // ─── MODE & BUCKET ─────────────────────────────────────────────────────────
    //

    pub fn select_bucket(&mut self, bucket: Bucket) -> Progress {
        self.bucket = bucket;
        let progress = self.recompute_progress();
        self.push_status(self.now());
        progress
    }

    /// Leaving classroom mode discards the current answers.
    pub async fn switch_mode(&mut self, mode: PracticeMode) {
        if mode == self.mode {
            return;
        }
        if self.mode.is_classroom() && !mode.is_classroom() {
            self.reset_answers().await;
        }
        self.mode = mode;
        self.store.set_raw(&keys::practice_mode(), mode.as_str()).await;
        info!(set = %self.set.id(), mode = %mode, "mode switched");
        self.recompute_progress();
        self.push_status(self.now());
    }

    //
    // ─── COACHING ──────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for an id outside the set.
    pub fn coach_view(&self, question_id: &QuestionId) -> Result<CoachView, SessionError> {
        self.coach
            .view(&self.set, question_id, self.elapsed_ms())
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.clone()))
    }

    /// Flip the explanation panel. `None` while the explanation is locked.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for an id outside the set.
    pub fn toggle_explanation(&mut self, question_id: &QuestionId) -> Result<Option<bool>, SessionError> {
        let now = self.now();
        let question = self.question(question_id)?.clone();
        Ok(self.coach.toggle_explanation(&question, now))
    }

    //
    // ─── TICKS ─────────────────────────────────────────────────────────────────
    //

    /// Solve-timer tick: periodic save, due coach writes, and a fresh status
    /// push after the dashboard reconnects.
    pub async fn timer_tick(&mut self) -> ClockDisplay {
        let now = self.now();
        if let Some(elapsed) = self.timer.save_due(now, self.config.timer_save_interval_ms) {
            self.save_elapsed(elapsed).await;
        }
        self.coach.flush_due(&self.store, now).await;
        if self.dashboard.as_ref().is_some_and(DashboardSyncClient::take_reconnected) {
            self.push_status(now);
        }
        self.clock_display()
    }

    #[must_use]
    pub fn clock_display(&self) -> ClockDisplay {
        self.timer
            .display(self.now(), self.mode, self.set.recommended_ms())
    }

    /// Coach tick: time-box check, then hint and explanation unlocking.
    ///
    /// Returns the time-box prompt when it fires; the timer is paused until
    /// `resolve_timebox`.
    pub async fn coach_tick(&mut self) -> Option<TimeboxPrompt> {
        if !self.mode.is_classroom() {
            return None;
        }
        let now = self.now();
        let today = calendar_day(now);
        let prompt = self.check_timebox(now, today).await;
        let elapsed = self.timer.elapsed_now(now);
        self.coach.advance_all(&self.set, elapsed, now);
        prompt
    }

    async fn check_timebox(&mut self, now: DateTime<Utc>, today: NaiveDate) -> Option<TimeboxPrompt> {
        let key = keys::class_timebox(self.set.id(), today);
        if self.timebox.needs_lookup(today) {
            let shown = self.store.get_raw(&key).await.as_deref() == Some("1");
            self.timebox.remember(today, shown);
        }
        let elapsed = self.timer.elapsed_now(now);
        let prompt = self.timebox.check(today, elapsed, self.set.recommended_ms())?;
        self.store.set_raw(&key, "1").await;
        self.pause_timer(now).await;
        info!(set = %self.set.id(), elapsed_ms = prompt.elapsed_ms, "time-box prompt raised");
        Some(prompt)
    }

    /// Close the time-box prompt. Returns the help outcome for `RequestHelp`.
    pub async fn resolve_timebox(&mut self, choice: TimeboxChoice) -> Option<HelpOutcome> {
        if !self.timebox.resolve() {
            return None;
        }
        if self.visible {
            self.timer.start(self.now());
        }
        match choice {
            TimeboxChoice::Continue => None,
            TimeboxChoice::RequestHelp => self.set_help(true).await,
        }
    }

    /// Dashboard tick: throttled activity stamp and a full status push.
    pub fn dashboard_tick(&mut self) {
        self.note_activity();
        self.push_status(self.now());
    }

    /// Page shown or hidden. Hiding pauses and saves the solve timer.
    pub async fn set_visible(&mut self, visible: bool) {
        let now = self.now();
        self.visible = visible;
        if visible {
            if !self.timebox.is_open() {
                self.timer.start(now);
            }
        } else {
            self.pause_timer(now).await;
        }
    }

    async fn pause_timer(&mut self, now: DateTime<Utc>) {
        let elapsed = self.timer.pause(now);
        self.save_elapsed(elapsed).await;
    }

    async fn save_elapsed(&self, elapsed: i64) {
        self.store
            .set_raw(&keys::solve_time(self.set.id()), &elapsed.to_string())
            .await;
    }

    //
    // ─── DASHBOARD ─────────────────────────────────────────────────────────────
    //

    /// Turn the help request on or off. `None` when no dashboard is attached.
    pub async fn set_help(&mut self, on: bool) -> Option<HelpOutcome> {
        let now = self.now();
        let dashboard = self.dashboard.as_mut()?;
        let outcome = dashboard.set_help(&self.store, on, now).await;
        if outcome.is_applied() {
            self.push_status(now);
        }
        Some(outcome)
    }

    pub async fn toggle_help(&mut self) -> Option<HelpOutcome> {
        let on = !self.dashboard.as_ref()?.help().active;
        self.set_help(on).await
    }

    /// Forget the room identity and disconnect.
    pub async fn reset_identity(&mut self) {
        if let Some(dashboard) = self.dashboard.take() {
            dashboard.identity().reset(&self.store).await;
            dashboard.close();
            info!("dashboard identity reset");
        }
    }

    /// Session fields of the next status push.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let now = self.now();
        let all: Vec<usize> = (0..self.set.len()).collect();
        let ids = self.set.questions().iter().map(Question::id);
        SessionStatus {
            set_id: self.set.id().clone(),
            set_title: self.set.title().to_string(),
            mode: self.mode.wire_name(),
            bucket: if self.mode.is_classroom() {
                self.bucket.as_str().to_string()
            } else {
                String::new()
            },
            progress: count(&self.set, &all, self.answers.sheet(), self.grading.book()),
            top_tries: self.grading.top_tries(ids, self.config.top_tries_limit),
            solve_elapsed_ms: self.timer.elapsed_now(now),
            grade_attempts_today: self.grading.attempts_today(calendar_day(now)),
        }
    }

    fn push_status(&self, now: DateTime<Utc>) {
        if let Some(dashboard) = &self.dashboard {
            dashboard.push(self.status(), now);
        }
    }

    fn recompute_progress(&mut self) -> Progress {
        let active = self.active();
        self.progress
            .recompute(&self.set, &active, self.answers.sheet(), self.grading.book())
    }

    //
    // ─── EXPORT & TEARDOWN ─────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn export(&self) -> GradingExport {
        let now = self.now();
        GradingExport::build(
            &self.set,
            self.answers.sheet(),
            self.grading.meta(),
            self.set.primary_language(),
            self.timer.elapsed_now(now),
            now,
        )
    }

    /// Persist the solve time and any pending coach write.
    pub async fn flush(&mut self) {
        let elapsed = self.timer.elapsed_now(self.now());
        self.save_elapsed(elapsed).await;
        self.coach.flush(&self.store).await;
    }

    /// Pause, flush and disconnect.
    pub async fn close(&mut self) {
        let now = self.now();
        self.pause_timer(now).await;
        self.coach.flush(&self.store).await;
        if let Some(dashboard) = &self.dashboard {
            dashboard.close();
        }
        debug!(set = %self.set.id(), "session closed");
    }
}
