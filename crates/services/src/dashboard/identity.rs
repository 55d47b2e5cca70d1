use practice_core::model::{RoomId, StudentId};
use storage::keys;
use tracing::info;

use crate::dashboard::protocol::{ClientMessage, Role};
use crate::persist::StateStore;

/// Who the session reports as. The student id is self-reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardIdentity {
    pub room: RoomId,
    pub student: StudentId,
    pub display_name: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl DashboardIdentity {
    /// Explicit values win and are remembered; otherwise the remembered ones are used.
    ///
    /// Returns `None` when no student id is known, which disables the dashboard.
    pub async fn resolve(
        store: &StateStore,
        room: Option<String>,
        student: Option<String>,
        display_name: Option<String>,
    ) -> Option<Self> {
        let room = match non_blank(room) {
            Some(room) => {
                store.set_raw(&keys::dashboard_room(), &room).await;
                Some(room)
            }
            None => non_blank(store.get_raw(&keys::dashboard_room()).await),
        };
        let student = match non_blank(student) {
            Some(student) => {
                store.set_raw(&keys::dashboard_student(), &student).await;
                Some(student)
            }
            None => non_blank(store.get_raw(&keys::dashboard_student()).await),
        };
        let display_name = match non_blank(display_name) {
            Some(name) => {
                store.set_raw(&keys::dashboard_display_name(), &name).await;
                Some(name)
            }
            None => non_blank(store.get_raw(&keys::dashboard_display_name()).await),
        };

        let Some(student) = student else {
            info!("no student id known; dashboard sync disabled");
            return None;
        };
        Some(Self {
            room: room.map(RoomId::new).unwrap_or_default(),
            display_name: display_name.unwrap_or_else(|| student.clone()),
            student: StudentId::new(student),
        })
    }

    /// Frame announcing this learner to the relay.
    #[must_use]
    pub fn hello(&self) -> ClientMessage {
        ClientMessage::Hello {
            role: Role::Student,
            room: self.room.clone(),
            student_id: Some(self.student.clone()),
            display_name: Some(self.display_name.clone()),
        }
    }

    /// Forget the remembered identity and this student's help state.
    pub async fn reset(&self, store: &StateStore) {
        store.remove(&keys::help_state(&self.room, &self.student)).await;
        store.remove(&keys::dashboard_room()).await;
        store.remove(&keys::dashboard_student()).await;
        store.remove(&keys::dashboard_display_name()).await;
    }
}
