use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use storage::JsonDirProblemSets;
use storage::repository::{ProblemSetRepository, SetIndexEntry, Storage, StorageError};
use url::Url;

use crate::Clock;
use crate::config::SessionConfig;
use crate::dashboard::{DashboardIdentity, StatusSink, WebSocketConnection};
use crate::error::AppServicesError;
use crate::persist::StateStore;
use crate::session::{SessionContext, SessionOptions};

/// Where and as whom a session reports progress.
#[derive(Debug, Clone, Default)]
pub struct DashboardOptions {
    /// Relay endpoint, e.g. `ws://127.0.0.1:8000/ws`.
    pub url: Option<String>,
    pub room: Option<String>,
    pub student: Option<String>,
    pub display_name: Option<String>,
}

/// Assembles storage and opens sessions against it.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    clock: Clock,
    config: SessionConfig,
}

impl AppServices {
    #[must_use]
    pub fn new(storage: Storage, clock: Clock, config: SessionConfig) -> Self {
        Self {
            storage,
            clock,
            config,
        }
    }

    /// Build services backed by `SQLite` state and problem sets read from `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Sqlite` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        data_dir: impl Into<PathBuf>,
        clock: Clock,
        config: SessionConfig,
    ) -> Result<Self, AppServicesError> {
        let sets: Arc<dyn ProblemSetRepository> = Arc::new(JsonDirProblemSets::new(data_dir));
        let storage = Storage::sqlite(db_url, sets).await?;
        Ok(Self::new(storage, clock, config))
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the set index cannot be read.
    pub async fn list_sets(&self) -> Result<Vec<SetIndexEntry>, StorageError> {
        self.storage.sets.list_sets().await
    }

    /// Open a session and, when an identity is known, connect it to the relay.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Session` if the set cannot be loaded and
    /// `AppServicesError::DashboardUrl` for a malformed relay url.
    pub async fn open_session(
        &self,
        options: SessionOptions,
        dashboard: &DashboardOptions,
    ) -> Result<SessionContext, AppServicesError> {
        let url = dashboard.url.as_deref().map(Url::parse).transpose()?;
        let mut session =
            SessionContext::open(&self.storage, self.config.clone(), self.clock, options).await?;

        let Some(url) = url else {
            return Ok(session);
        };
        let store = StateStore::new(self.storage.values.clone());
        let identity = DashboardIdentity::resolve(
            &store,
            dashboard.room.clone(),
            dashboard.student.clone(),
            dashboard.display_name.clone(),
        )
        .await;
        if let Some(identity) = identity {
            let connection = WebSocketConnection::open(
                url,
                &identity.hello(),
                Duration::from_millis(self.config.reconnect_delay_ms),
            );
            let sink: Arc<dyn StatusSink> = Arc::new(connection);
            session.attach_dashboard(identity, sink).await;
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::model::{Question, QuestionId, QuestionKind, SetId};
    use practice_core::model::ProblemSet;
    use practice_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    fn services() -> AppServices {
        let repo = InMemoryRepository::new();
        let question = Question::new(
            QuestionId::new("q"),
            QuestionKind::ShortAnswer {
                expected_text: Some("1".into()),
                accepted: Vec::new(),
            },
        )
        .unwrap();
        repo.insert_set(ProblemSet::new(SetId::new("s"), "Set", vec![question]).unwrap())
            .unwrap();
        AppServices::new(Storage::from_repository(repo), fixed_clock(), SessionConfig::default())
    }

    #[tokio::test]
    async fn session_without_dashboard_opens() {
        let services = services();
        let session = services
            .open_session(SessionOptions::new(SetId::new("s")), &DashboardOptions::default())
            .await
            .unwrap();
        assert!(session.dashboard().is_none());
        assert_eq!(services.list_sets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_dashboard_url_is_rejected() {
        let dashboard = DashboardOptions {
            url: Some("not a url".into()),
            ..DashboardOptions::default()
        };
        let err = services()
            .open_session(SessionOptions::new(SetId::new("s")), &dashboard)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppServicesError::DashboardUrl(_)));
    }

    #[tokio::test]
    async fn unknown_set_is_reported() {
        let err = services()
            .open_session(SessionOptions::new(SetId::new("nope")), &DashboardOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppServicesError::Session(_)));
    }
}
