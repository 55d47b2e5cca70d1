//! Key builders for the persistent key-value namespace.
//!
//! Every key is prefixed with `stepcode:`. Set-scoped keys carry the set id;
//! help state is scoped to a room and student.

use chrono::NaiveDate;
use practice_core::model::{RoomId, SetId, StudentId};

const PREFIX: &str = "stepcode";

#[must_use]
pub fn answers(set: &SetId) -> String {
    format!("{PREFIX}:answers:{set}")
}

#[must_use]
pub fn practice_mode() -> String {
    format!("{PREFIX}:practiceMode")
}

#[must_use]
pub fn coach_state(set: &SetId) -> String {
    format!("{PREFIX}:coachState:{set}")
}

#[must_use]
pub fn grade_meta(set: &SetId) -> String {
    format!("{PREFIX}:gradeMeta:{set}")
}

#[must_use]
pub fn question_grade_meta(set: &SetId) -> String {
    format!("{PREFIX}:qGradeMeta:{set}")
}

#[must_use]
pub fn solve_time(set: &SetId) -> String {
    format!("{PREFIX}:solveTime:{set}")
}

/// Flag key for "time-box prompt already shown" on `day`.
#[must_use]
pub fn class_timebox(set: &SetId, day: NaiveDate) -> String {
    format!("{PREFIX}:classTimebox:{set}:{}", day.format("%Y-%m-%d"))
}

#[must_use]
pub fn help_state(room: &RoomId, student: &StudentId) -> String {
    format!("{PREFIX}:dashHelp:{room}:{student}")
}

#[must_use]
pub fn dashboard_student() -> String {
    format!("{PREFIX}:dashStudentId")
}

#[must_use]
pub fn dashboard_display_name() -> String {
    format!("{PREFIX}:dashDisplayName")
}

#[must_use]
pub fn dashboard_room() -> String {
    format!("{PREFIX}:dashRoomId")
}
