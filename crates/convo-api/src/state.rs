//! Shared application state: services wired onto the SQLite repository
//! and the upstream HTTP client.

use std::sync::Arc;

use anyhow::Context;

use convo_core::session::SessionService;
use convo_core::turn::TurnCoordinator;
use convo_infra::config::ServerSettings;
use convo_infra::llm::HttpInferenceClient;
use convo_infra::sqlite::{DatabasePool, SqliteSessionRepository};

pub type Sessions = SessionService<SqliteSessionRepository>;
pub type Coordinator = TurnCoordinator<SqliteSessionRepository, HttpInferenceClient>;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<Sessions>,
    pub coordinator: Arc<Coordinator>,
    pub client: Arc<HttpInferenceClient>,
    pub settings: Arc<ServerSettings>,
}

impl AppState {
    /// Open the database, run migrations, and wire up the services.
    pub async fn init(settings: ServerSettings) -> anyhow::Result<Self> {
        let pool = DatabasePool::new(&settings.database_url())
            .await
            .with_context(|| format!("opening database at {}", settings.database_path))?;
        let repo = Arc::new(SqliteSessionRepository::new(pool));
        let sessions = Arc::new(SessionService::new(repo, settings.relay.session_timeout));

        let client = Arc::new(
            HttpInferenceClient::new(&settings.relay.upstream_url, settings.relay.request_timeout)
                .context("building upstream client")?,
        );

        let coordinator = Arc::new(TurnCoordinator::new(
            Arc::clone(&sessions),
            Arc::clone(&client),
            &settings.relay,
        ));

        Ok(Self {
            sessions,
            coordinator,
            client,
            settings: Arc::new(settings),
        })
    }
}
