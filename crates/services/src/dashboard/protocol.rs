//! JSON messages exchanged with the room relay.
//!
//! Every frame is one object tagged by `type`.

use practice_core::model::{RoomId, SetId, StudentId, TopTry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::progress::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
}

/// Frames sent by a session or a teacher console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        role: Role,
        room: RoomId,
        #[serde(rename = "studentId", default, skip_serializing_if = "Option::is_none")]
        student_id: Option<StudentId>,
        #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    Status {
        room: RoomId,
        payload: StatusPayload,
    },
    SnapshotRequest,
}

/// Full progress snapshot of one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub room: RoomId,
    pub student_id: StudentId,
    pub display_name: String,
    pub set_id: SetId,
    pub set_title: String,
    /// `"class"` or `"practice"`.
    pub mode: String,
    /// Selected bucket in classroom mode, empty otherwise.
    pub bucket: String,
    pub progress: Progress,
    pub top_tries: Vec<TopTry>,
    pub solve_elapsed_ms: i64,
    pub grade_attempts_today: u32,
    /// Epoch milliseconds.
    pub last_activity_at: i64,
    pub help_active: bool,
    /// Epoch milliseconds, 0 when no help is requested.
    pub help_requested_at: i64,
    pub help_qid: String,
}

/// Frames sent by the relay.
///
/// Roster entries are kept as raw objects so fields added by newer sessions
/// pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    HelloAck {
        role: Role,
        room: RoomId,
        #[serde(rename = "studentKey", default, skip_serializing_if = "Option::is_none")]
        student_key: Option<String>,
    },
    Snapshot {
        room: RoomId,
        items: Vec<Map<String, Value>>,
    },
    Status {
        room: RoomId,
        #[serde(rename = "studentKey")]
        student_key: String,
        payload: Map<String, Value>,
    },
    Bye {
        room: RoomId,
        #[serde(rename = "studentKey")]
        student_key: String,
    },
}
