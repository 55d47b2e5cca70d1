use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Session variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PracticeMode {
    /// Free practice: no coaching, no cooldown, all questions visible.
    #[default]
    #[serde(rename = "normal")]
    Practice,
    /// Classroom: time-boxing, coaching, grading cooldown and bucket views.
    #[serde(rename = "class")]
    Classroom,
}

impl PracticeMode {
    /// Persisted form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PracticeMode::Practice => "normal",
            PracticeMode::Classroom => "class",
        }
    }

    /// Form reported to the teacher console.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            PracticeMode::Practice => "practice",
            PracticeMode::Classroom => "class",
        }
    }

    #[must_use]
    pub fn is_classroom(self) -> bool {
        self == PracticeMode::Classroom
    }

    /// Picks the effective mode: forced, then persisted, then requested.
    #[must_use]
    pub fn resolve(
        forced: Option<PracticeMode>,
        saved: Option<PracticeMode>,
        requested: Option<PracticeMode>,
    ) -> PracticeMode {
        forced.or(saved).or(requested).unwrap_or_default()
    }
}

impl fmt::Display for PracticeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown practice mode: {0}")]
pub struct ParseModeError(String);

impl FromStr for PracticeMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "class" | "classroom" => Ok(PracticeMode::Classroom),
            "normal" | "practice" => Ok(PracticeMode::Practice),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}
