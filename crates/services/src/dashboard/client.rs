use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use practice_core::model::{QuestionId, SetId, TopTry};
use storage::keys;
use tracing::debug;

use crate::config::SessionConfig;
use crate::dashboard::help::{HelpOutcome, HelpState};
use crate::dashboard::identity::DashboardIdentity;
use crate::dashboard::protocol::{ClientMessage, StatusPayload};
use crate::persist::StateStore;
use crate::progress::Progress;

//
// ─── SINK ──────────────────────────────────────────────────────────────────────
//

/// Outbound side of the realtime channel.
///
/// Sends never block and never fail; a sink that is offline drops the frame.
pub trait StatusSink: Send + Sync {
    fn send(&self, message: ClientMessage);
    fn close(&self);

    /// Returns `true` once after every (re)connect, so the owner can follow
    /// the replayed status with a fresh one.
    fn take_reconnected(&self) -> bool {
        false
    }
}

/// Sink that keeps every frame in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<ClientMessage>>,
    closed: AtomicBool,
    reconnected: AtomicBool,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Payloads of the status frames, oldest first.
    #[must_use]
    pub fn statuses(&self) -> Vec<StatusPayload> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                ClientMessage::Status { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pretends the transport just came back online.
    pub fn mark_reconnected(&self) {
        self.reconnected.store(true, Ordering::SeqCst);
    }
}

impl StatusSink for RecordingSink {
    fn send(&self, message: ClientMessage) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn take_reconnected(&self) -> bool {
        self.reconnected.swap(false, Ordering::SeqCst)
    }
}

//
// ─── CLIENT ────────────────────────────────────────────────────────────────────
//

/// Session-side fields of a status push.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub set_id: SetId,
    pub set_title: String,
    pub mode: &'static str,
    pub bucket: String,
    pub progress: Progress,
    pub top_tries: Vec<TopTry>,
    pub solve_elapsed_ms: i64,
    pub grade_attempts_today: u32,
}

/// Reports a learner's progress to the room and owns the help request.
pub struct DashboardSyncClient {
    identity: DashboardIdentity,
    help: HelpState,
    focus_qid: Option<QuestionId>,
    last_activity_at: i64,
    last_throttled_at: i64,
    help_cooldown_ms: i64,
    activity_throttle_ms: i64,
    sink: Arc<dyn StatusSink>,
}

impl DashboardSyncClient {
    /// Restores the help state of `identity`; malformed data starts fresh.
    pub async fn open(
        store: &StateStore,
        identity: DashboardIdentity,
        sink: Arc<dyn StatusSink>,
        config: &SessionConfig,
    ) -> Self {
        let help = store
            .load_json::<HelpState>(&keys::help_state(&identity.room, &identity.student))
            .await
            .unwrap_or_default();
        Self {
            identity,
            help,
            focus_qid: None,
            last_activity_at: 0,
            last_throttled_at: 0,
            help_cooldown_ms: config.help_cooldown_ms,
            activity_throttle_ms: config.activity_throttle_ms,
            sink,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &DashboardIdentity {
        &self.identity
    }

    #[must_use]
    pub fn help(&self) -> &HelpState {
        &self.help
    }

    #[must_use]
    pub fn focus_qid(&self) -> Option<&QuestionId> {
        self.focus_qid.as_ref()
    }

    #[must_use]
    pub fn last_activity_at(&self) -> i64 {
        self.last_activity_at
    }

    #[must_use]
    pub fn help_remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        self.help.remaining_ms(now.timestamp_millis())
    }

    #[must_use]
    pub fn hello(&self) -> ClientMessage {
        self.identity.hello()
    }

    /// Answer input on `question_id`: it becomes the help focus.
    pub fn note_input(&mut self, question_id: &QuestionId, now: DateTime<Utc>) {
        self.focus_qid = Some(question_id.clone());
        self.mark_activity(now, false);
    }

    /// Stamps the last activity time. Throttled stamps are spaced out.
    pub fn mark_activity(&mut self, now: DateTime<Utc>, throttled: bool) {
        let now_ms = now.timestamp_millis();
        if throttled {
            if now_ms - self.last_throttled_at < self.activity_throttle_ms {
                return;
            }
            self.last_throttled_at = now_ms;
        }
        self.last_activity_at = now_ms;
    }

    /// Toggles the help request and persists it when applied.
    pub async fn set_help(&mut self, store: &StateStore, on: bool, now: DateTime<Utc>) -> HelpOutcome {
        let focus = self.focus_qid.as_ref().map_or("", QuestionId::as_str);
        let outcome = self
            .help
            .set_active(on, now.timestamp_millis(), focus, self.help_cooldown_ms);
        debug!(room = %self.identity.room, student = %self.identity.student, ?outcome, "help toggled");
        if outcome.is_applied() {
            store
                .save_json(
                    &keys::help_state(&self.identity.room, &self.identity.student),
                    &self.help,
                )
                .await;
        }
        outcome
    }

    #[must_use]
    pub fn payload(&self, status: SessionStatus, now: DateTime<Utc>) -> StatusPayload {
        let last_activity_at = if self.last_activity_at > 0 {
            self.last_activity_at
        } else {
            now.timestamp_millis()
        };
        StatusPayload {
            room: self.identity.room.clone(),
            student_id: self.identity.student.clone(),
            display_name: self.identity.display_name.clone(),
            set_id: status.set_id,
            set_title: status.set_title,
            mode: status.mode.to_string(),
            bucket: status.bucket,
            progress: status.progress,
            top_tries: status.top_tries,
            solve_elapsed_ms: status.solve_elapsed_ms,
            grade_attempts_today: status.grade_attempts_today,
            last_activity_at,
            help_active: self.help.active,
            help_requested_at: self.help.at,
            help_qid: self.help.qid.clone(),
        }
    }

    pub fn push(&self, status: SessionStatus, now: DateTime<Utc>) {
        let payload = self.payload(status, now);
        self.sink.send(ClientMessage::Status {
            room: self.identity.room.clone(),
            payload,
        });
    }

    pub fn close(&self) {
        self.sink.close();
    }

    /// See [`StatusSink::take_reconnected`].
    #[must_use]
    pub fn take_reconnected(&self) -> bool {
        self.sink.take_reconnected()
    }
}
