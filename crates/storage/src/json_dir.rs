//! Problem sets read from a data directory.
//!
//! Layout: `<root>/sets.index.json` lists `{id, file}` rows and each set lives
//! in `<root>/sets/<file>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use practice_core::model::{ProblemSet, SetId};
use tracing::debug;

use crate::repository::{ProblemSetRecord, ProblemSetRepository, SetIndexEntry, StorageError};

pub const INDEX_FILE: &str = "sets.index.json";
pub const SETS_DIR: &str = "sets";

#[derive(Debug, Clone)]
pub struct JsonDirProblemSets {
    root: PathBuf,
}

impl JsonDirProblemSets {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read(path: &Path) -> Result<String, StorageError> {
        tokio::fs::read_to_string(path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound
            } else {
                StorageError::Io(format!("{}: {err}", path.display()))
            }
        })
    }
}

#[async_trait]
impl ProblemSetRepository for JsonDirProblemSets {
    async fn list_sets(&self) -> Result<Vec<SetIndexEntry>, StorageError> {
        let path = self.root.join(INDEX_FILE);
        let raw = Self::read(&path).await?;
        serde_json::from_str(&raw)
            .map_err(|err| StorageError::Serialization(format!("{}: {err}", path.display())))
    }

    async fn load_set(&self, id: &SetId) -> Result<ProblemSet, StorageError> {
        let index = self.list_sets().await?;
        let entry = index
            .into_iter()
            .find(|entry| &entry.id == id)
            .ok_or(StorageError::NotFound)?;

        // Index entries name a file inside the sets directory, never a path.
        let file_name = Path::new(&entry.file)
            .file_name()
            .ok_or_else(|| StorageError::Serialization(format!("invalid set file: {}", entry.file)))?;
        let path = self.root.join(SETS_DIR).join(file_name);
        debug!(set = %id, path = %path.display(), "loading problem set");

        let raw = Self::read(&path).await?;
        let record: ProblemSetRecord = serde_json::from_str(&raw)
            .map_err(|err| StorageError::Serialization(format!("{}: {err}", path.display())))?;
        let record = ProblemSetRecord {
            title: record.title.or(entry.title),
            category_id: record.category_id.or(entry.category_id),
            ..record
        };
        record
            .into_problem_set(id.clone())
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }
}
