use crate::content::{initial_content, DEFAULT_ICON};
use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, EntityId, File, Folder, Identity, PanelSide, Workspace};
use crate::notify::Notifier;
use crate::persistence::Persistence;
use crate::session::EditorSessions;
use crate::store::AppStore;
use chrono::Utc;
use std::sync::Arc;

const UNTITLED: &str = "Untitled";

/// User-facing flows over the store: every mutation is applied locally first,
/// persisted once in the background, and rolled back if persistence fails.
#[derive(Clone)]
pub struct WorkspaceCore {
    store: AppStore,
    persistence: Arc<dyn Persistence>,
    notifier: Notifier,
    settings: AppSettings,
    sessions: EditorSessions,
}

impl WorkspaceCore {
    pub fn new(store: AppStore, persistence: Arc<dyn Persistence>, notifier: Notifier, settings: AppSettings) -> Self {
        let sessions = EditorSessions::new(
            store.clone(),
            Arc::clone(&persistence),
            notifier.clone(),
            settings.autosave_quiet_period(),
        );
        Self {
            store,
            persistence,
            notifier,
            settings,
            sessions,
        }
    }

    pub fn store(&self) -> &AppStore {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn sessions(&self) -> &EditorSessions {
        &self.sessions
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub async fn load_workspace(&self, workspace_id: &EntityId) -> AppResult<()> {
        match self.persistence.load_workspace(workspace_id).await {
            Ok(snapshot) => {
                self.store.reconcile(snapshot);
                tracing::debug!(workspace_id = %workspace_id, "workspace loaded");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(workspace_id = %workspace_id, error = %error, "failed to load workspace");
                self.notifier.action_failed("load workspace");
                Err(error)
            }
        }
    }

    pub async fn create_workspace(&self, title: &str, icon: &str) -> AppResult<Identity> {
        let Some(owner_id) = self.store.snapshot().user_id.clone() else {
            self.notifier.action_failed("create workspace");
            return Err(AppError::Validation("no signed-in user".to_string()));
        };

        let identity = Identity::pending();
        let draft = Workspace {
            id: identity.id().clone(),
            title: title.to_string(),
            icon_id: icon.to_string(),
            banner_url: None,
            workspace_owner_id: owner_id,
            in_trash: false,
            created_at: Utc::now(),
        };
        self.store.add_workspace(draft.clone());

        match self.persistence.create_workspace(draft).await {
            Ok(created) => {
                let server_id = created.id.clone();
                self.store.confirm_workspace(identity.id(), created);
                tracing::info!(workspace_id = %server_id, "workspace created");
                self.notifier.success("Workspace created.");
                Ok(identity.confirm(server_id))
            }
            Err(error) => {
                tracing::warn!(temp_id = %identity.id(), error = %error, "workspace create failed; rolling back");
                self.store.delete_workspace(identity.id());
                self.notifier.action_failed("create workspace");
                Err(error)
            }
        }
    }

    pub async fn create_folder(&self, title: &str, icon: &str) -> AppResult<Identity> {
        self.validate_folder_title(title)?;
        let workspace_id = self.active_workspace("create folder")?;

        let identity = Identity::pending();
        let draft = Folder {
            id: identity.id().clone(),
            title: title.to_string(),
            icon_id: icon.to_string(),
            banner_url: None,
            workspace_id,
            in_trash: false,
            created_at: Utc::now(),
        };
        self.store.add_folder(draft.clone());

        match self.persistence.create_folder(draft).await {
            Ok(created) => {
                let server_id = created.id.clone();
                self.store.confirm_folder(identity.id(), created);
                tracing::info!(folder_id = %server_id, "folder created");
                self.notifier.success("Folder created.");
                Ok(identity.confirm(server_id))
            }
            Err(error) => {
                tracing::warn!(temp_id = %identity.id(), error = %error, "folder create failed; rolling back");
                self.store.delete_folder(identity.id());
                self.notifier.action_failed("create folder");
                Err(error)
            }
        }
    }

    /// New blank page, at the workspace root when `folder_id` is `None`.
    pub async fn create_file(&self, folder_id: Option<EntityId>) -> AppResult<Identity> {
        let workspace_id = self.active_workspace("create file")?;

        let identity = Identity::pending();
        let draft = File {
            id: identity.id().clone(),
            title: UNTITLED.to_string(),
            icon_id: DEFAULT_ICON.to_string(),
            data: Some(initial_content()),
            banner_url: None,
            workspace_id,
            folder_id,
            in_trash: false,
            is_published: false,
            created_at: Utc::now(),
        };
        self.store.add_file(draft.clone());

        match self.persistence.create_file(draft).await {
            Ok(created) => {
                let server_id = created.id.clone();
                self.sessions.retarget(identity.id(), &server_id).await;
                self.store.confirm_file(identity.id(), created);
                tracing::info!(file_id = %server_id, "file created");
                self.notifier.success("File created.");
                Ok(identity.confirm(server_id))
            }
            Err(error) => {
                tracing::warn!(temp_id = %identity.id(), error = %error, "file create failed; rolling back");
                self.store.delete_file(identity.id());
                self.notifier.action_failed("create file");
                Err(error)
            }
        }
    }

    pub async fn rename_workspace(&self, workspace_id: &EntityId, title: &str, icon: &str) -> AppResult<()> {
        let Some(previous) = self.store.snapshot().workspace(workspace_id).cloned() else {
            self.notifier.error_with("Something went wrong", "Workspace not found.");
            return Err(AppError::NotFound(format!("workspace {}", workspace_id)));
        };
        let renamed = Workspace {
            title: title.to_string(),
            icon_id: icon.to_string(),
            ..previous.clone()
        };
        self.store.update_workspace(renamed.clone());

        match self.persistence.update_workspace(renamed).await {
            Ok(saved) => {
                self.store.update_workspace(saved);
                tracing::info!(workspace_id = %workspace_id, "workspace updated");
                self.notifier.success("Workspace updated.");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(workspace_id = %workspace_id, error = %error, "workspace update failed; reverting");
                self.store.update_workspace(previous);
                self.notifier.action_failed("update workspace");
                Err(error)
            }
        }
    }

    /// Removes the workspace entry. The backend drops its folders and files.
    pub async fn delete_workspace(&self, workspace_id: &EntityId) -> AppResult<()> {
        let Some(removed) = self.store.delete_workspace(workspace_id) else {
            return Err(AppError::NotFound(format!("workspace {}", workspace_id)));
        };

        match self.persistence.delete_workspace(workspace_id).await {
            Ok(()) => {
                tracing::info!(workspace_id = %workspace_id, "workspace deleted");
                self.notifier.success("Workspace deleted.");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(workspace_id = %workspace_id, error = %error, "workspace delete failed; restoring");
                self.store.add_workspace(removed);
                self.notifier.action_failed("delete workspace");
                Err(error)
            }
        }
    }

    pub async fn rename_folder(&self, folder_id: &EntityId, title: &str, icon: &str) -> AppResult<()> {
        self.validate_folder_title(title)?;
        let previous = self.existing_folder(folder_id)?;
        let renamed = Folder {
            title: title.to_string(),
            icon_id: icon.to_string(),
            ..previous.clone()
        };
        self.persist_folder(previous, renamed, "Folder updated.", "update folder")
            .await
    }

    pub async fn move_file_to_trash(&self, file_id: &EntityId) -> AppResult<()> {
        self.set_file_trash(file_id, true, "File moved to trash.", "move file to trash")
            .await
    }

    pub async fn restore_file(&self, file_id: &EntityId) -> AppResult<()> {
        self.set_file_trash(file_id, false, "File restored.", "restore file")
            .await
    }

    pub async fn move_folder_to_trash(&self, folder_id: &EntityId) -> AppResult<()> {
        let previous = self.existing_folder(folder_id)?;
        let trashed = Folder {
            in_trash: true,
            ..previous.clone()
        };
        self.persist_folder(previous, trashed, "Folder moved to trash.", "move folder to trash")
            .await
    }

    pub async fn restore_folder(&self, folder_id: &EntityId) -> AppResult<()> {
        let previous = self.existing_folder(folder_id)?;
        let restored = Folder {
            in_trash: false,
            ..previous.clone()
        };
        self.persist_folder(previous, restored, "Folder restored.", "restore folder")
            .await
    }

    /// Sets or clears the banner. An open editor carries the change in its next
    /// autosave so the banner and the rest of the draft stay one save unit.
    pub async fn set_file_banner(&self, file_id: &EntityId, banner_url: Option<String>) -> AppResult<()> {
        let previous = self.existing_file(file_id)?;
        self.store.update_file_banner(file_id, banner_url.clone());

        match self.sessions.set_banner(file_id, banner_url.clone()).await {
            Ok(()) => {
                tracing::info!(file_id = %file_id, "banner handed to open editor");
                self.notifier.success("Banner updated.");
                return Ok(());
            }
            Err(AppError::NotFound(_)) => {}
            Err(error) => {
                self.store.update_file_banner(file_id, previous.banner_url);
                return Err(error);
            }
        }

        let updated = File {
            banner_url,
            ..previous.clone()
        };
        match self.persistence.update_file(updated).await {
            Ok(saved) => {
                self.store.update_file(saved);
                tracing::info!(file_id = %file_id, "banner updated");
                self.notifier.success("Banner updated.");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(file_id = %file_id, error = %error, "banner update failed; reverting");
                self.store.update_file_banner(file_id, previous.banner_url);
                self.notifier.action_failed("update banner");
                Err(error)
            }
        }
    }

    /// Permanent delete. The file comes back if the backend refuses.
    pub async fn delete_file(&self, file_id: &EntityId) -> AppResult<()> {
        let Some(removed) = self.store.delete_file(file_id) else {
            return Err(AppError::NotFound(format!("file {}", file_id)));
        };
        self.sessions.close(file_id).await;

        match self.persistence.delete_file(file_id).await {
            Ok(()) => {
                tracing::info!(file_id = %file_id, "file deleted");
                self.notifier.success("File deleted permanently.");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(file_id = %file_id, error = %error, "file delete failed; restoring");
                self.store.add_file(removed);
                self.notifier.action_failed("delete file");
                Err(error)
            }
        }
    }

    /// Permanent delete of a folder and, locally, the files inside it.
    pub async fn delete_folder(&self, folder_id: &EntityId) -> AppResult<()> {
        let (folder, files) = self.store.delete_folder_with_files(folder_id);
        let Some(folder) = folder else {
            return Err(AppError::NotFound(format!("folder {}", folder_id)));
        };
        for file in &files {
            self.sessions.close(&file.id).await;
        }

        match self.persistence.delete_folder(folder_id).await {
            Ok(()) => {
                tracing::info!(folder_id = %folder_id, files = files.len(), "folder deleted");
                self.notifier.success("Folder deleted permanently.");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(folder_id = %folder_id, error = %error, "folder delete failed; restoring");
                self.store.restore_folder_with_files(folder, files);
                self.notifier.action_failed("delete folder");
                Err(error)
            }
        }
    }

    pub async fn open_file(&self, file_id: &EntityId) -> AppResult<()> {
        self.store.open_file(file_id.clone());
        self.sessions.open(file_id).await?;
        self.sessions.close_hidden(&self.store.snapshot().panels).await;
        Ok(())
    }

    pub async fn open_beside(&self, file_id: &EntityId) -> AppResult<()> {
        self.store.open_beside(file_id.clone());
        self.sessions.open(file_id).await
    }

    pub async fn close_panel(&self, side: PanelSide) {
        self.store.close_panel(side);
        let closed = self.sessions.close_hidden(&self.store.snapshot().panels).await;
        if !closed.is_empty() {
            tracing::debug!(side = side.as_str(), closed = closed.len(), "closed hidden editors");
        }
    }

    fn validate_folder_title(&self, title: &str) -> AppResult<()> {
        let min = self.settings.min_folder_title_len;
        if title.chars().count() < min {
            let message = format!("Folder name must be at least {} characters long.", min);
            self.notifier.warning(message.clone());
            return Err(AppError::Validation(message));
        }
        Ok(())
    }

    fn active_workspace(&self, action: &str) -> AppResult<EntityId> {
        match self.store.snapshot().workspace_id.clone() {
            Some(workspace_id) => Ok(workspace_id),
            None => {
                self.notifier.action_failed(action);
                Err(AppError::Validation("no active workspace".to_string()))
            }
        }
    }

    fn existing_file(&self, file_id: &EntityId) -> AppResult<File> {
        match self.store.snapshot().file(file_id) {
            Some(file) => Ok(file.clone()),
            None => {
                self.notifier.error_with("Something went wrong", "File not found.");
                Err(AppError::NotFound(format!("file {}", file_id)))
            }
        }
    }

    fn existing_folder(&self, folder_id: &EntityId) -> AppResult<Folder> {
        match self.store.snapshot().folder(folder_id) {
            Some(folder) => Ok(folder.clone()),
            None => {
                self.notifier.error_with("Something went wrong", "Folder not found.");
                Err(AppError::NotFound(format!("folder {}", folder_id)))
            }
        }
    }

    async fn set_file_trash(&self, file_id: &EntityId, in_trash: bool, success: &str, action: &str) -> AppResult<()> {
        let previous = self.existing_file(file_id)?;
        let updated = File {
            in_trash,
            ..previous.clone()
        };
        self.store.update_file(updated.clone());

        match self.persistence.update_file(updated).await {
            Ok(saved) => {
                self.store.update_file(saved);
                tracing::info!(file_id = %file_id, in_trash, "file trash state changed");
                self.notifier.success(success);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(file_id = %file_id, error = %error, "file update failed; reverting");
                self.store.update_file(previous);
                self.notifier.action_failed(action);
                Err(error)
            }
        }
    }

    async fn persist_folder(&self, previous: Folder, updated: Folder, success: &str, action: &str) -> AppResult<()> {
        self.store.update_folder(updated.clone());

        match self.persistence.update_folder(updated).await {
            Ok(saved) => {
                tracing::info!(folder_id = %saved.id, "folder updated");
                self.store.update_folder(saved);
                self.notifier.success(success);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(folder_id = %previous.id, error = %error, "folder update failed; reverting");
                self.store.update_folder(previous);
                self.notifier.action_failed(action);
                Err(error)
            }
        }
    }
}
