pub mod content;
pub mod db;
pub mod debounce;
pub mod editor;
pub mod errors;
pub mod models;
pub mod notify;
pub mod panels;
pub mod persistence;
pub mod session;
pub mod store;
pub mod workspace;

use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, EntityId};
use crate::notify::Notifier;
use crate::store::AppStore;
use crate::workspace::WorkspaceCore;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Wired application: the optimistic core on top of the local SQLite backend.
#[derive(Clone)]
pub struct App {
    pub core: WorkspaceCore,
    pub database: Arc<Database>,
}

impl App {
    /// Fetches the workspace, folds it into the store, and remembers it as last visited.
    pub async fn navigate(&self, workspace_id: &EntityId) -> AppResult<()> {
        self.core.load_workspace(workspace_id).await?;
        self.database.remember_workspace(workspace_id)?;
        Ok(())
    }

    /// Reopens the last visited workspace, if one is remembered.
    pub async fn resume(&self) -> AppResult<Option<EntityId>> {
        let settings = self.database.get_settings()?;
        let Some(workspace_id) = settings.last_visited_workspace_id else {
            return Ok(None);
        };
        self.navigate(&workspace_id).await?;
        Ok(Some(workspace_id))
    }

    pub fn settings(&self) -> AppResult<AppSettings> {
        self.database.get_settings()
    }
}

pub fn bootstrap(data_dir: &Path) -> AppResult<App> {
    std::fs::create_dir_all(data_dir)?;
    if LOG_GUARD.get().is_none() {
        if let Err(error) = init_tracing(data_dir) {
            tracing::debug!(error = %error, "tracing already initialised");
        }
    }

    let database = Arc::new(Database::new(&data_dir.join("dnotes.db"))?);
    let settings = database.get_settings()?;
    tracing::info!(
        db_path = %database.path().to_string_lossy(),
        quiet_period_ms = settings.autosave_quiet_period_ms,
        "workspace core starting"
    );

    let core = WorkspaceCore::new(AppStore::new(), database.clone(), Notifier::new(), settings);
    Ok(App { core, database })
}

fn init_tracing(data_dir: &Path) -> AppResult<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "dnotes.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
