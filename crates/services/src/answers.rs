use practice_core::model::{AnswerSheet, AnswerValue, QuestionId, SetId};
use storage::keys;

use crate::persist::StateStore;

/// In-memory answers of the active set, mirrored to persistence on every change.
#[derive(Debug, Clone)]
pub struct AnswerStore {
    set_id: SetId,
    sheet: AnswerSheet,
}

impl AnswerStore {
    /// Restore the saved answers of `set_id`; corrupt data yields an empty sheet.
    pub async fn load(store: &StateStore, set_id: SetId) -> Self {
        let sheet = store
            .load_json::<AnswerSheet>(&keys::answers(&set_id))
            .await
            .unwrap_or_default();
        Self { set_id, sheet }
    }

    #[must_use]
    pub fn sheet(&self) -> &AnswerSheet {
        &self.sheet
    }

    #[must_use]
    pub fn get(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.sheet.get(question_id)
    }

    /// Store `value` and persist the full map. No validation happens here.
    pub async fn record(&mut self, store: &StateStore, question_id: QuestionId, value: AnswerValue) {
        self.sheet.record(question_id, value);
        self.save(store).await;
    }

    /// Drop every answer and persist the empty map.
    pub async fn clear(&mut self, store: &StateStore) {
        self.sheet.clear();
        self.save(store).await;
    }

    async fn save(&self, store: &StateStore) {
        store.save_json(&keys::answers(&self.set_id), &self.sheet).await;
    }
}
