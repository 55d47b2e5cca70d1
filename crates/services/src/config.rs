//! Timing configuration for a practice session.

/// Timing constants of the session runtime, in milliseconds unless noted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Window after a grading action during which classroom grading is blocked.
    pub grade_cooldown_ms: i64,
    /// Window after a successful help activation during which re-activation is blocked.
    pub help_cooldown_ms: i64,
    pub timer_tick_ms: u64,
    /// Interval between solve-time saves while the timer runs.
    pub timer_save_interval_ms: i64,
    pub coach_tick_ms: u64,
    /// Coalescing window for coach state writes.
    pub coach_write_delay_ms: i64,
    pub dashboard_push_ms: u64,
    /// Minimum spacing of throttled activity stamps.
    pub activity_throttle_ms: i64,
    pub reconnect_delay_ms: u64,
    /// Number of questions reported in `topTries`.
    pub top_tries_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grade_cooldown_ms: 20_000,
            help_cooldown_ms: 20_000,
            timer_tick_ms: 250,
            timer_save_interval_ms: 2_000,
            coach_tick_ms: 1_000,
            coach_write_delay_ms: 300,
            dashboard_push_ms: 10_000,
            activity_throttle_ms: 3_000,
            reconnect_delay_ms: 3_000,
            top_tries_limit: 3,
        }
    }
}

/// Timing of the room relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// How often the roster is swept for silent students.
    pub sweep_interval_ms: u64,
    /// Silence after which a student is dropped from the roster.
    pub expire_after_ms: i64,
    /// Ping interval on open connections.
    pub heartbeat_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 10_000,
            expire_after_ms: 180_000,
            heartbeat_ms: 25_000,
        }
    }
}
