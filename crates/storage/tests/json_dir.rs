use std::fs;

use practice_core::model::{Bucket, QuestionType, SetId};
use storage::json_dir::JsonDirProblemSets;
use storage::repository::{ProblemSetRepository, StorageError};

const INDEX: &str = r#"[
    {"id": "loops-1", "file": "loops-1.json", "title": "Loops I", "categoryId": "c-basics"},
    {"id": "broken", "file": "broken.json"},
    {"id": "missing", "file": "missing.json"}
]"#;

const LOOPS: &str = r#"{
    "recommendedMinutes": 12,
    "coreCount": 2,
    "availableLanguages": ["c", "python"],
    "problems": [
        {"id": "q1", "type": "mcq", "options": ["a", "b"], "correctIndex": 1, "hint": "look at b"},
        {"id": "q2", "type": "short", "expectedText": "55", "explanation": "sum of 1..10"},
        {"id": "q3", "type": "code", "expectedCode": "for(i=0;i<n;i++)", "bucket": "supp", "recommendedSec": 120}
    ]
}"#;

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("sets.index.json"), INDEX).unwrap();
    fs::create_dir(dir.path().join("sets")).unwrap();
    fs::write(dir.path().join("sets/loops-1.json"), LOOPS).unwrap();
    fs::write(dir.path().join("sets/broken.json"), "{ not json").unwrap();
    dir
}

#[tokio::test]
async fn loads_set_through_index() {
    let dir = fixture();
    let repo = JsonDirProblemSets::new(dir.path());

    let set = repo.load_set(&SetId::new("loops-1")).await.expect("load");
    assert_eq!(set.title(), "Loops I");
    assert_eq!(set.category_id(), Some("c-basics"));
    assert_eq!(set.len(), 3);
    assert_eq!(set.languages(), ["c".to_string(), "python".to_string()]);
    assert_eq!(set.questions()[0].question_type(), QuestionType::MultipleChoice);
    assert_eq!(set.questions()[0].hint(1), Some("look at b"));
    assert_eq!(set.resolved_bucket(2), Bucket::Supplemental);
    assert_eq!(set.question_recommended_ms(2), 120_000);
    assert_eq!(set.question_recommended_ms(0), 360_000);
}

#[tokio::test]
async fn unknown_set_is_not_found() {
    let dir = fixture();
    let repo = JsonDirProblemSets::new(dir.path());
    let err = repo.load_set(&SetId::new("nope")).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn missing_file_and_bad_json_fail() {
    let dir = fixture();
    let repo = JsonDirProblemSets::new(dir.path());

    let err = repo.load_set(&SetId::new("missing")).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));

    let err = repo.load_set(&SetId::new("broken")).await.unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
}

#[tokio::test]
async fn lists_index_entries() {
    let dir = fixture();
    let repo = JsonDirProblemSets::new(dir.path());
    let sets = repo.list_sets().await.unwrap();
    assert_eq!(sets.len(), 3);
    assert_eq!(sets[0].id, SetId::new("loops-1"));
}
