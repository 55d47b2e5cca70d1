use async_trait::async_trait;
use practice_core::model::{Bucket, MAX_HINTS, ProblemSet, Question, QuestionKind, SetId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

//
// ─── KEY-VALUE STORE ───────────────────────────────────────────────────────────
//

/// String-keyed, string-valued persistence for session state.
///
/// Values are serialized JSON. Callers in the session layer treat every error
/// as "value absent".
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend rejects the write.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend rejects the delete.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

//
// ─── PROBLEM SETS ──────────────────────────────────────────────────────────────
//

/// One row of `sets.index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetIndexEntry {
    pub id: SetId,
    pub file: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
}

/// Accepted code given either as one string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// A non-negative integer or a numeric string; anything else is absent.
fn lenient_index<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let index = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(index.and_then(|i| usize::try_from(i).ok()))
}

/// A positive whole number; zero, fractions, strings and the like are absent.
fn positive_whole<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0))
}

/// Persisted shape of a question as authored in a set file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub correct_index: Option<usize>,
    #[serde(default)]
    pub expected_text: Option<String>,
    #[serde(default)]
    pub expected_any_of: Vec<String>,
    #[serde(default)]
    pub expected_code: Option<OneOrMany>,
    #[serde(default)]
    pub expected_codes: Vec<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default, deserialize_with = "positive_whole")]
    pub recommended_sec: Option<u32>,
    #[serde(default)]
    pub bucket: Option<String>,
}

impl QuestionRecord {
    /// Convert the record into a domain `Question`.
    ///
    /// A non-empty `hints` list wins over the single `hint`; extra hints are dropped.
    /// A missing or unusable grading key still loads; the question then never
    /// grades correct.
    ///
    /// # Errors
    ///
    /// Returns `practice_core::Error` for an unknown type or a blank id.
    pub fn into_question(self) -> Result<Question, practice_core::Error> {
        let id = self.id;
        let kind = match self.kind.as_str() {
            "mcq" => QuestionKind::MultipleChoice {
                options: self.options,
                // Out of range for any option list, so a missing index never matches.
                correct_index: self.correct_index.unwrap_or(usize::MAX),
            },
            "short" => QuestionKind::ShortAnswer {
                expected_text: self.expected_text,
                accepted: self.expected_any_of,
            },
            "code" => {
                let mut accepted = self.expected_code.map(OneOrMany::into_vec).unwrap_or_default();
                accepted.extend(self.expected_codes);
                QuestionKind::Code { accepted }
            }
            other => {
                return Err(practice_core::Error::UnknownQuestionType {
                    id,
                    kind: other.to_string(),
                });
            }
        };

        let hints = if self.hints.iter().any(|h| !h.trim().is_empty()) {
            self.hints
        } else {
            self.hint.into_iter().collect()
        };

        if !kind.is_gradable() {
            warn!(question = %id, "question has no usable answer key");
        }
        let mut question = Question::authored(id.as_str().into(), kind)
            .map_err(practice_core::Error::for_question(&id))?
            .with_prompt(self.title, self.description, self.code)
            .with_hints(
                hints
                    .into_iter()
                    .filter(|h| !h.trim().is_empty())
                    .take(MAX_HINTS),
            )
            .map_err(practice_core::Error::for_question(&id))?;
        if let Some(explanation) = self.explanation {
            question = question.with_explanation(explanation);
        }
        if let Some(secs) = self.recommended_sec.filter(|secs| *secs > 0) {
            question = question
                .with_recommended_secs(secs)
                .map_err(practice_core::Error::for_question(&id))?;
        }
        if let Some(bucket) = self.bucket.as_deref().and_then(Bucket::from_tag) {
            question = question.with_bucket(bucket);
        }
        Ok(question)
    }
}

/// Persisted shape of a problem set file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemSetRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub available_languages: Vec<String>,
    #[serde(default, deserialize_with = "positive_whole")]
    pub recommended_minutes: Option<u32>,
    #[serde(default)]
    pub core_count: Option<usize>,
    #[serde(default)]
    pub problems: Vec<QuestionRecord>,
}

impl ProblemSetRecord {
    /// Convert the record into a domain `ProblemSet` identified by `id`.
    ///
    /// # Errors
    ///
    /// Returns `practice_core::Error` if any question or the set itself is invalid.
    pub fn into_problem_set(self, id: SetId) -> Result<ProblemSet, practice_core::Error> {
        let questions = self
            .problems
            .into_iter()
            .map(QuestionRecord::into_question)
            .collect::<Result<Vec<_>, _>>()?;
        let title = self.title.unwrap_or_else(|| id.to_string());

        let mut set = ProblemSet::new(id, title, questions)?.with_languages(self.available_languages);
        if let Some(category) = self.category_id {
            set = set.with_category(category);
        }
        if let Some(minutes) = self.recommended_minutes {
            set = set.with_recommended_minutes(minutes)?;
        }
        if let Some(core_count) = self.core_count {
            set = set.with_core_count(core_count);
        }
        Ok(set)
    }
}

/// Source of problem sets.
#[async_trait]
pub trait ProblemSetRepository: Send + Sync {
    /// List the sets known to the index.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the index cannot be read or parsed.
    async fn list_sets(&self) -> Result<Vec<SetIndexEntry>, StorageError>;

    /// Load and validate a set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown set id, and other
    /// storage errors for unreadable or malformed set data.
    async fn load_set(&self, id: &SetId) -> Result<ProblemSet, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    values: Arc<Mutex<HashMap<String, String>>>,
    sets: Arc<Mutex<HashMap<SetId, ProblemSet>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a set so `load_set` can find it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert_set(&self, set: ProblemSet) -> Result<(), StorageError> {
        let mut guard = self
            .sets
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(set.id().clone(), set);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

#[async_trait]
impl ProblemSetRepository for InMemoryRepository {
    async fn list_sets(&self) -> Result<Vec<SetIndexEntry>, StorageError> {
        let guard = self
            .sets
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut entries: Vec<SetIndexEntry> = guard
            .values()
            .map(|set| SetIndexEntry {
                id: set.id().clone(),
                file: format!("{}.json", set.id()),
                title: Some(set.title().to_owned()),
                category_id: set.category_id().map(str::to_owned),
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    async fn load_set(&self, id: &SetId) -> Result<ProblemSet, StorageError> {
        let guard = self
            .sets
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(id).cloned().ok_or(StorageError::NotFound)
    }
}

/// Aggregates the key-value store and the problem-set source behind trait objects.
#[derive(Clone)]
pub struct Storage {
    pub values: Arc<dyn KeyValueStore>,
    pub sets: Arc<dyn ProblemSetRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self::from_repository(repo)
    }

    /// Build a `Storage` whose values and sets both come from `repo`.
    #[must_use]
    pub fn from_repository(repo: InMemoryRepository) -> Self {
        let values: Arc<dyn KeyValueStore> = Arc::new(repo.clone());
        let sets: Arc<dyn ProblemSetRepository> = Arc::new(repo);
        Self { values, sets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::grading::grade;
    use practice_core::model::{AnswerValue, QuestionType};

    fn record(json: &str) -> QuestionRecord {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn kv_round_trips_and_removes() {
        let repo = InMemoryRepository::new();
        repo.set("k", "\"v\"").await.unwrap();
        assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("\"v\""));
        repo.remove("k").await.unwrap();
        repo.remove("k").await.unwrap();
        assert_eq!(repo.get("k").await.unwrap(), None);
    }

    #[test]
    fn expected_code_accepts_string_or_list() {
        let one = record(r#"{"id":"c1","type":"code","expectedCode":"x=1;"}"#)
            .into_question()
            .unwrap();
        let many = record(
            r#"{"id":"c2","type":"code","expectedCode":["x=1;"],"expectedCodes":["x = 1 ;"]}"#,
        )
        .into_question()
        .unwrap();
        assert_eq!(one.question_type(), QuestionType::Code);
        match many.kind() {
            QuestionKind::Code { accepted } => assert_eq!(accepted.len(), 2),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn hints_list_wins_over_single_hint() {
        let q = record(
            r#"{"id":"s","type":"short","expectedText":"1","hint":"old","hints":["a","","b","c"]}"#,
        )
        .into_question()
        .unwrap();
        assert_eq!(q.hints(), ["a".to_string(), "b".to_string()]);

        let q = record(r#"{"id":"s","type":"short","expectedText":"1","hint":"only"}"#)
            .into_question()
            .unwrap();
        assert_eq!(q.hint(1), Some("only"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = record(r#"{"id":"x","type":"essay"}"#).into_question().unwrap_err();
        assert!(matches!(err, practice_core::Error::UnknownQuestionType { .. }));
    }

    #[test]
    fn correct_index_accepts_numeric_strings() {
        let q = record(r#"{"id":"m","type":"mcq","options":["a","b"],"correctIndex":"1"}"#)
            .into_question()
            .unwrap();
        assert!(grade(&q, Some(&AnswerValue::Choice(1))));
        assert!(!grade(&q, Some(&AnswerValue::Choice(0))));
    }

    #[test]
    fn unusable_answer_keys_load_but_never_grade_correct() {
        let cases = [
            r#"{"id":"m1","type":"mcq","options":["a","b"]}"#,
            r#"{"id":"m2","type":"mcq","options":["a","b"],"correctIndex":7}"#,
            r#"{"id":"m3","type":"mcq","options":["a","b"],"correctIndex":"x"}"#,
            r#"{"id":"s","type":"short"}"#,
            r#"{"id":"c","type":"code","expectedCode":"  "}"#,
        ];
        for json in cases {
            let q = record(json).into_question().unwrap();
            assert!(!q.kind().is_gradable(), "{json}");
            for answer in ["0", "1", "7", ""] {
                assert!(!grade(&q, Some(&AnswerValue::Text(answer.into()))), "{json}");
            }
        }
    }

    #[test]
    fn malformed_recommended_seconds_are_unset() {
        for raw in ["0", "120.5", "\"90\"", "-5", "null"] {
            let json = format!(r#"{{"id":"s","type":"short","expectedText":"1","recommendedSec":{raw}}}"#);
            let q = record(&json).into_question().unwrap();
            assert_eq!(q.recommended_secs(), None, "{raw}");
        }
        let q = record(r#"{"id":"s","type":"short","expectedText":"1","recommendedSec":120}"#)
            .into_question()
            .unwrap();
        assert_eq!(q.recommended_secs(), Some(120));
    }

    #[test]
    fn unset_question_duration_falls_back_to_the_floor() {
        let rec: ProblemSetRecord = serde_json::from_str(
            r#"{
                "recommendedMinutes": 1,
                "problems": [{"id":"a","type":"short","expectedText":"1","recommendedSec":0}]
            }"#,
        )
        .unwrap();
        let set = rec.into_problem_set(SetId::new("s")).unwrap();
        assert_eq!(set.question_recommended_ms(0), 90_000);
    }

    #[test]
    fn set_record_applies_timing_and_buckets() {
        let rec: ProblemSetRecord = serde_json::from_str(
            r#"{
                "title": "Loops",
                "recommendedMinutes": 10,
                "coreCount": 1,
                "problems": [
                    {"id":"a","type":"short","expectedText":"1"},
                    {"id":"b","type":"short","expectedText":"2","bucket":"core"}
                ]
            }"#,
        )
        .unwrap();
        let set = rec.into_problem_set(SetId::new("loops")).unwrap();
        assert_eq!(set.title(), "Loops");
        assert_eq!(set.recommended_ms(), 600_000);
        assert_eq!(set.resolved_bucket(1), Bucket::Core);
        assert_eq!(set.primary_language(), "c");
    }
}
