use crate::editor::FileEditor;
use crate::errors::{AppError, AppResult};
use crate::models::{EntityId, FileDraft};
use crate::notify::Notifier;
use crate::panels::PanelState;
use crate::persistence::Persistence;
use crate::store::AppStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

/// Open editors, at most one per file. Removing an entry unmounts its editor.
#[derive(Clone)]
pub struct EditorSessions {
    editors: Arc<Mutex<HashMap<EntityId, FileEditor>>>,
    store: AppStore,
    persistence: Arc<dyn Persistence>,
    notifier: Notifier,
    quiet_period: Duration,
}

impl EditorSessions {
    pub fn new(store: AppStore, persistence: Arc<dyn Persistence>, notifier: Notifier, quiet_period: Duration) -> Self {
        Self {
            editors: Arc::new(Mutex::new(HashMap::new())),
            store,
            persistence,
            notifier,
            quiet_period,
        }
    }

    /// Mounts an editor for `file_id` unless one is already open.
    pub async fn open(&self, file_id: &EntityId) -> AppResult<()> {
        let mut editors = self.editors.lock().await;
        if editors.contains_key(file_id) {
            return Ok(());
        }
        let editor = FileEditor::mount(
            file_id,
            self.store.clone(),
            Arc::clone(&self.persistence),
            self.notifier.clone(),
            self.quiet_period,
        )?;
        editors.insert(file_id.clone(), editor);
        Ok(())
    }

    pub async fn close(&self, file_id: &EntityId) -> bool {
        let removed = self.editors.lock().await.remove(file_id);
        match removed {
            Some(editor) => {
                editor.close();
                true
            }
            None => false,
        }
    }

    /// Re-keys the editor mounted on `temp_id` to the confirmed `server_id`.
    pub async fn retarget(&self, temp_id: &EntityId, server_id: &EntityId) -> bool {
        let mut editors = self.editors.lock().await;
        let Some(editor) = editors.remove(temp_id) else {
            return false;
        };
        editor.retarget(server_id);
        if let Some(stale) = editors.insert(server_id.clone(), editor) {
            stale.close();
        }
        true
    }

    /// Closes every editor whose file is no longer shown in either panel slot.
    pub async fn close_hidden(&self, panels: &PanelState) -> Vec<EntityId> {
        let mut editors = self.editors.lock().await;
        let hidden: Vec<EntityId> = editors
            .keys()
            .filter(|file_id| !panels.is_visible(file_id))
            .cloned()
            .collect();
        for file_id in &hidden {
            if let Some(editor) = editors.remove(file_id) {
                editor.close();
            }
        }
        hidden
    }

    pub async fn is_open(&self, file_id: &EntityId) -> bool {
        self.editors.lock().await.contains_key(file_id)
    }

    pub async fn open_count(&self) -> usize {
        self.editors.lock().await.len()
    }

    pub async fn draft(&self, file_id: &EntityId) -> AppResult<FileDraft> {
        self.with_editor(file_id, |editor| Ok(editor.draft().clone())).await
    }

    pub async fn edit_content(&self, file_id: &EntityId, content: &str) -> AppResult<()> {
        self.with_editor(file_id, |editor| {
            editor.edit_content(content);
            Ok(())
        })
        .await
    }

    pub async fn set_title(&self, file_id: &EntityId, title: &str) -> AppResult<()> {
        self.with_editor(file_id, |editor| {
            editor.set_title(title);
            Ok(())
        })
        .await
    }

    pub async fn set_icon(&self, file_id: &EntityId, icon: &str) -> AppResult<()> {
        self.with_editor(file_id, |editor| editor.set_icon(icon)).await
    }

    pub async fn set_banner(&self, file_id: &EntityId, banner_url: Option<String>) -> AppResult<()> {
        self.with_editor(file_id, |editor| {
            editor.set_banner(banner_url);
            Ok(())
        })
        .await
    }

    async fn with_editor<R>(
        &self,
        file_id: &EntityId,
        action: impl FnOnce(&mut FileEditor) -> AppResult<R>,
    ) -> AppResult<R> {
        let mut editors = self.editors.lock().await;
        let Some(editor) = editors.get_mut(file_id) else {
            return Err(AppError::NotFound(format!("No open editor for file {}", file_id)));
        };
        action(editor)
    }
}

#[cfg(test)]
mod tests {
    use super::EditorSessions;
    use crate::errors::AppError;
    use crate::models::{EntityId, EntityKind, File, PanelSide};
    use crate::notify::Notifier;
    use crate::persistence::{InMemoryPersistence, PersistOp};
    use crate::store::{AppStore, EntityCollection, StoreState};
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    const QUIET: Duration = Duration::from_millis(1000);

    fn file(id: &str) -> File {
        File {
            id: EntityId::new(id),
            title: "Untitled".to_string(),
            icon_id: "📄".to_string(),
            data: Some("[]".to_string()),
            banner_url: None,
            workspace_id: EntityId::new("ws-1"),
            folder_id: None,
            in_trash: false,
            is_published: false,
            created_at: Utc::now(),
        }
    }

    fn setup() -> (AppStore, Arc<InMemoryPersistence>, EditorSessions) {
        let files = vec![file("a"), file("b")];
        let store = AppStore::with_state(StoreState {
            files: EntityCollection::new(files.clone()),
            ..StoreState::default()
        });
        let persistence = Arc::new(InMemoryPersistence::seeded(Vec::new(), Vec::new(), files));
        let sessions = EditorSessions::new(store.clone(), persistence.clone(), Notifier::new(), QUIET);
        (store, persistence, sessions)
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_keeps_the_existing_draft() {
        let (_store, _persistence, sessions) = setup();
        let a = EntityId::new("a");
        sessions.open(&a).await.expect("open");
        sessions.set_title(&a, "Kept").await.expect("title");
        sessions.open(&a).await.expect("reopen");

        assert_eq!(sessions.open_count().await, 1);
        assert_eq!(sessions.draft(&a).await.expect("draft").title, "Kept");
    }

    #[tokio::test(start_paused = true)]
    async fn closing_session_cancels_pending_save() {
        let (_store, persistence, sessions) = setup();
        let a = EntityId::new("a");
        sessions.open(&a).await.expect("open");
        sessions.set_title(&a, "Never saved").await.expect("title");
        assert!(sessions.close(&a).await);
        sleep(QUIET * 3).await;

        assert_eq!(persistence.calls(EntityKind::File, PersistOp::Update), 0);
        assert!(!sessions.is_open(&a).await);
    }

    #[tokio::test(start_paused = true)]
    async fn edits_without_session_are_not_found() {
        let (_store, _persistence, sessions) = setup();
        let result = sessions.set_title(&EntityId::new("a"), "x").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn retargeted_session_follows_the_confirmed_id() {
        let (store, _, _) = setup();
        let temp = EntityId::new("a");
        let confirmed = File {
            id: EntityId::new("srv-a"),
            ..file("a")
        };
        let persistence = Arc::new(InMemoryPersistence::seeded(Vec::new(), Vec::new(), vec![confirmed.clone()]));
        let sessions = EditorSessions::new(store.clone(), persistence.clone(), Notifier::new(), QUIET);
        sessions.open(&temp).await.expect("open");

        assert!(sessions.retarget(&temp, &confirmed.id).await);
        store.confirm_file(&temp, confirmed.clone());
        sessions.set_title(&confirmed.id, "Kept").await.expect("title");
        sleep(QUIET * 3).await;

        assert_eq!(persistence.calls(EntityKind::File, PersistOp::Update), 1);
        assert_eq!(store.snapshot().file(&confirmed.id).map(|f| f.title.clone()), Some("Kept".to_string()));
        assert!(matches!(sessions.set_title(&temp, "lost").await, Err(AppError::NotFound(_))));
        assert!(!sessions.retarget(&temp, &confirmed.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_files_are_closed() {
        let (store, _persistence, sessions) = setup();
        let a = EntityId::new("a");
        let b = EntityId::new("b");
        sessions.open(&a).await.expect("open a");
        sessions.open(&b).await.expect("open b");
        store.set_panel_file(PanelSide::Left, b.clone());

        let closed = sessions.close_hidden(&store.snapshot().panels).await;
        assert_eq!(closed, vec![a.clone()]);
        assert!(sessions.is_open(&b).await);
        assert!(!sessions.is_open(&a).await);
    }
}
