#![forbid(unsafe_code)]

pub mod json_dir;
pub mod keys;
pub mod repository;
pub mod sqlite;

pub use json_dir::JsonDirProblemSets;
pub use repository::{
    InMemoryRepository, KeyValueStore, ProblemSetRecord, ProblemSetRepository, QuestionRecord,
    SetIndexEntry, Storage, StorageError,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
