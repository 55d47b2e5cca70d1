use chrono::{DateTime, Utc};
use practice_core::model::PracticeMode;
use practice_core::time::format_elapsed;

//
// ─── SOLVE TIMER ───────────────────────────────────────────────────────────────
//

/// Two-state stopwatch of the time spent solving a set.
///
/// Paused while the session is hidden. `elapsed_now` is a pure read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveTimer {
    elapsed_ms: i64,
    started_at: Option<DateTime<Utc>>,
    last_saved_at: Option<DateTime<Utc>>,
}

impl SolveTimer {
    /// A paused timer resuming from `elapsed_ms`.
    #[must_use]
    pub fn new(elapsed_ms: i64) -> Self {
        Self {
            elapsed_ms: elapsed_ms.max(0),
            started_at: None,
            last_saved_at: None,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Paused to Running. Returns false if already running.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        self.last_saved_at = Some(now);
        true
    }

    /// Running to Paused, folding the running span into the total.
    ///
    /// Returns the accumulated total so the caller can flush it.
    pub fn pause(&mut self, now: DateTime<Utc>) -> i64 {
        if let Some(started) = self.started_at.take() {
            self.elapsed_ms += (now - started).num_milliseconds().max(0);
        }
        self.elapsed_ms
    }

    #[must_use]
    pub fn elapsed_now(&self, now: DateTime<Utc>) -> i64 {
        match self.started_at {
            Some(started) => self.elapsed_ms + (now - started).num_milliseconds().max(0),
            None => self.elapsed_ms,
        }
    }

    /// Returns the value to persist when a periodic save is due.
    pub fn save_due(&mut self, now: DateTime<Utc>, interval_ms: i64) -> Option<i64> {
        self.started_at?;
        let last = self.last_saved_at.unwrap_or(now);
        if (now - last).num_milliseconds() < interval_ms {
            return None;
        }
        self.last_saved_at = Some(now);
        Some(self.elapsed_now(now))
    }

    /// Zero the total, keeping the running state.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.elapsed_ms = 0;
        if self.started_at.is_some() {
            self.started_at = Some(now);
            self.last_saved_at = Some(now);
        }
    }

    /// Formatted clock for the current mode.
    #[must_use]
    pub fn display(&self, now: DateTime<Utc>, mode: PracticeMode, recommended_ms: i64) -> ClockDisplay {
        let elapsed = self.elapsed_now(now);
        let paused = !self.is_running();
        if !mode.is_classroom() {
            return ClockDisplay {
                kind: ClockKind::Stopwatch,
                main: format_elapsed(elapsed),
                overflow: None,
                paused,
            };
        }

        let remaining = recommended_ms - elapsed;
        let (main, overflow) = if remaining >= 0 {
            (format_elapsed(remaining), None)
        } else {
            let overflow = (!paused).then(|| format!("+{}", format_elapsed(-remaining)));
            (format_elapsed(0), overflow)
        };
        ClockDisplay {
            kind: ClockKind::Countdown,
            main,
            overflow,
            paused,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    /// Counts elapsed solve time up.
    Stopwatch,
    /// Counts down to the set's recommended duration.
    Countdown,
}

/// What the solve clock shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockDisplay {
    pub kind: ClockKind,
    pub main: String,
    /// Time past the recommendation, shown only while running.
    pub overflow: Option<String>,
    pub paused: bool,
}
