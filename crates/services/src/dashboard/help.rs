use serde::{Deserialize, Serialize};

/// Raise-hand state, persisted per (room, student). Times are epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpState {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub at: i64,
    #[serde(default)]
    pub qid: String,
    #[serde(default)]
    pub cooldown_until: i64,
}

/// Result of a help toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpOutcome {
    /// Off to on; the cooldown restarted.
    Activated,
    /// Already on; timestamp and question refreshed, cooldown untouched.
    Refreshed,
    Deactivated,
    /// Off to on inside the cooldown. Nothing changed.
    CoolingDown { remaining_ms: i64 },
}

impl HelpOutcome {
    #[must_use]
    pub fn is_applied(self) -> bool {
        !matches!(self, HelpOutcome::CoolingDown { .. })
    }
}

impl HelpState {
    #[must_use]
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        (self.cooldown_until - now_ms).max(0)
    }

    /// Only the off-to-on transition is gated. Turning off is always immediate.
    pub fn set_active(&mut self, on: bool, now_ms: i64, focus_qid: &str, cooldown_ms: i64) -> HelpOutcome {
        if !on {
            self.active = false;
            self.at = 0;
            self.qid.clear();
            return HelpOutcome::Deactivated;
        }

        let outcome = if self.active {
            HelpOutcome::Refreshed
        } else {
            let remaining_ms = self.remaining_ms(now_ms);
            if remaining_ms > 0 {
                return HelpOutcome::CoolingDown { remaining_ms };
            }
            self.cooldown_until = now_ms + cooldown_ms;
            HelpOutcome::Activated
        };
        self.active = true;
        self.at = now_ms;
        self.qid = focus_qid.to_string();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: i64 = 20_000;

    #[test]
    fn reactivation_inside_cooldown_is_rejected() {
        let mut help = HelpState::default();
        assert_eq!(help.set_active(true, 0, "q1", COOLDOWN), HelpOutcome::Activated);
        assert_eq!(help.cooldown_until, 20_000);

        assert_eq!(help.set_active(true, 10_000, "q2", COOLDOWN), HelpOutcome::Refreshed);
        assert_eq!(help.cooldown_until, 20_000);
        assert_eq!(help.qid, "q2");

        assert_eq!(help.set_active(false, 11_000, "", COOLDOWN), HelpOutcome::Deactivated);
        assert_eq!(help.at, 0);
        assert_eq!(
            help.set_active(true, 12_000, "q2", COOLDOWN),
            HelpOutcome::CoolingDown { remaining_ms: 8_000 }
        );
        assert!(!help.active);

        assert_eq!(help.set_active(true, 20_000, "q2", COOLDOWN), HelpOutcome::Activated);
        assert!(help.active);
    }

    #[test]
    fn persisted_shape_is_stable() {
        let help: HelpState =
            serde_json::from_str(r#"{"active":true,"at":5,"qid":"q","cooldownUntil":9}"#).unwrap();
        assert!(help.active);
        assert_eq!(help.cooldown_until, 9);
        let partial: HelpState = serde_json::from_str("{}").unwrap();
        assert_eq!(partial, HelpState::default());
    }
}
