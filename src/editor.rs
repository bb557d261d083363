use crate::content::{extract_icon_and_header, normalize_leading_blocks, with_icon};
use crate::debounce::{Debouncer, Saver};
use crate::errors::{AppError, AppResult};
use crate::models::{EntityId, FileDraft};
use crate::notify::Notifier;
use crate::persistence::Persistence;
use crate::store::AppStore;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// Local draft of one open file, autosaved as a single unit.
///
/// Title, icon, content and banner always travel together in one save so
/// they cannot land out of order relative to each other. Dropping the
/// editor discards a save that is still waiting for its quiet period.
/// The file id is shared with the saver so a confirmed create can retarget
/// an editor mounted on the temporary id.
pub struct FileEditor {
    file_id: Arc<Mutex<EntityId>>,
    draft: FileDraft,
    debouncer: Debouncer<FileDraft>,
}

impl FileEditor {
    pub fn mount(
        file_id: &EntityId,
        store: AppStore,
        persistence: Arc<dyn Persistence>,
        notifier: Notifier,
        quiet_period: Duration,
    ) -> AppResult<Self> {
        let snapshot = store.snapshot();
        let file = snapshot
            .file(file_id)
            .ok_or_else(|| AppError::NotFound(format!("file {}", file_id)))?;
        let draft = FileDraft::from_file(file);

        let shared_id = Arc::new(Mutex::new(file_id.clone()));
        let saver = draft_saver(Arc::clone(&shared_id), store, persistence, notifier);
        let debouncer = Debouncer::with_saved(quiet_period, saver, draft.clone());
        tracing::debug!(file_id = %file_id, "editor mounted");

        Ok(Self {
            file_id: shared_id,
            draft,
            debouncer,
        })
    }

    pub fn file_id(&self) -> EntityId {
        current_id(&self.file_id)
    }

    /// Points this editor and its pending saves at `file_id`.
    pub fn retarget(&self, file_id: &EntityId) {
        let previous = match self.file_id.lock() {
            Ok(mut current) => std::mem::replace(&mut *current, file_id.clone()),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), file_id.clone()),
        };
        tracing::debug!(from = %previous, to = %file_id, "editor retargeted");
    }

    pub fn draft(&self) -> &FileDraft {
        &self.draft
    }

    pub fn last_saved(&self) -> Option<FileDraft> {
        self.debouncer.last_saved()
    }

    /// Replaces the content and re-derives title and icon from its leading blocks.
    pub fn edit_content(&mut self, content: &str) {
        let normalized = normalize_leading_blocks(content);
        let heading = extract_icon_and_header(&normalized);
        self.draft.data = normalized;
        self.draft.title = heading.header;
        self.draft.icon_id = heading.icon;
        self.schedule();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.draft.title = title.into();
        self.schedule();
    }

    pub fn set_icon(&mut self, icon: &str) -> AppResult<()> {
        self.draft.data = with_icon(&self.draft.data, icon, &self.draft.title)?;
        self.draft.icon_id = icon.to_string();
        self.schedule();
        Ok(())
    }

    pub fn set_banner(&mut self, banner_url: Option<String>) {
        self.draft.banner_url = banner_url;
        self.schedule();
    }

    pub fn close(self) {
        tracing::debug!(file_id = %self.file_id(), "editor closed");
    }

    fn schedule(&self) {
        self.debouncer.schedule(self.draft.clone());
    }
}

fn current_id(shared: &Mutex<EntityId>) -> EntityId {
    match shared.lock() {
        Ok(id) => id.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn draft_saver(
    file_id: Arc<Mutex<EntityId>>,
    store: AppStore,
    persistence: Arc<dyn Persistence>,
    notifier: Notifier,
) -> Saver<FileDraft> {
    Arc::new(move |draft: FileDraft| {
        let file_id = current_id(&file_id);
        let store = store.clone();
        let persistence = Arc::clone(&persistence);
        let notifier = notifier.clone();
        Box::pin(async move { save_draft(&file_id, &store, persistence.as_ref(), &notifier, draft).await })
    })
}

async fn save_draft(
    file_id: &EntityId,
    store: &AppStore,
    persistence: &dyn Persistence,
    notifier: &Notifier,
    draft: FileDraft,
) -> AppResult<()> {
    let Some(current) = store.snapshot().file(file_id).cloned() else {
        tracing::warn!(file_id = %file_id, "file left the store before autosave; skipping");
        return Ok(());
    };

    match persistence.update_file(draft.apply_to(&current)).await {
        Ok(saved) => {
            store.update_file(saved);
            tracing::debug!(file_id = %file_id, "autosaved file");
            Ok(())
        }
        Err(error) => {
            tracing::warn!(file_id = %file_id, error = %error, "autosave failed");
            notifier.error("Failed to save file");
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FileEditor;
    use crate::content::extract_icon_and_header;
    use crate::models::{EntityId, EntityKind, File, FileDraft};
    use crate::notify::{NoticeLevel, Notifier};
    use crate::persistence::{InMemoryPersistence, PersistOp};
    use crate::store::{AppStore, EntityCollection, StoreState};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    const QUIET: Duration = Duration::from_millis(1000);

    fn file() -> File {
        File {
            id: EntityId::new("file-1"),
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

    fn page(icon: &str, header: &str) -> String {
        json!([
            { "type": "paragraph", "content": [{ "type": "text", "text": icon, "styles": {} }] },
            { "type": "heading", "props": { "level": 1 }, "content": [{ "type": "text", "text": header, "styles": {} }] }
        ])
        .to_string()
    }

    fn setup() -> (AppStore, Arc<InMemoryPersistence>, Notifier) {
        let store = AppStore::with_state(StoreState {
            files: EntityCollection::new(vec![file()]),
            ..StoreState::default()
        });
        let persistence = Arc::new(InMemoryPersistence::seeded(Vec::new(), Vec::new(), vec![file()]));
        (store, persistence, Notifier::new())
    }

    fn mount(store: &AppStore, persistence: &Arc<InMemoryPersistence>, notifier: &Notifier) -> FileEditor {
        FileEditor::mount(
            &EntityId::new("file-1"),
            store.clone(),
            persistence.clone(),
            notifier.clone(),
            QUIET,
        )
        .expect("mount")
    }

    #[tokio::test(start_paused = true)]
    async fn typing_burst_saves_once_with_final_draft() {
        let (store, persistence, notifier) = setup();
        let mut editor = mount(&store, &persistence, &notifier);

        editor.edit_content(&page("🚀", "L"));
        sleep(Duration::from_millis(200)).await;
        editor.edit_content(&page("🚀", "Lau"));
        sleep(Duration::from_millis(200)).await;
        editor.edit_content(&page("🚀", "Launch"));
        sleep(QUIET * 3).await;

        assert_eq!(persistence.calls(EntityKind::File, PersistOp::Update), 1);
        let saved = store.snapshot().file(&EntityId::new("file-1")).cloned().expect("file");
        assert_eq!(saved.title, "Launch");
        assert_eq!(saved.icon_id, "🚀");
        assert_eq!(persistence.files()[0].title, "Launch");
        assert_eq!(editor.last_saved().map(|draft| draft.title), Some("Launch".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_before_quiet_period_saves_nothing() {
        let (store, persistence, notifier) = setup();
        let mut editor = mount(&store, &persistence, &notifier);

        editor.set_title("Draft title");
        sleep(Duration::from_millis(300)).await;
        editor.close();
        sleep(QUIET * 3).await;

        assert_eq!(persistence.calls(EntityKind::File, PersistOp::Update), 0);
        assert_eq!(store.snapshot().files.as_slice()[0].title, "Untitled");
    }

    #[tokio::test(start_paused = true)]
    async fn reverting_to_saved_state_skips_the_save() {
        let (store, persistence, notifier) = setup();
        let mut editor = mount(&store, &persistence, &notifier);

        editor.set_title("Something else");
        editor.set_title("Untitled");
        sleep(QUIET * 3).await;

        assert_eq!(persistence.calls(EntityKind::File, PersistOp::Update), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_raises_notice() {
        let (store, persistence, notifier) = setup();
        let mut receiver = notifier.subscribe();
        let mut editor = mount(&store, &persistence, &notifier);
        persistence.fail_next(EntityKind::File, PersistOp::Update);

        editor.set_banner(Some("https://cdn.example/banner.png".to_string()));
        sleep(QUIET * 3).await;

        let notice = receiver.try_recv().expect("notice");
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Failed to save file");
        assert_eq!(editor.last_saved().and_then(|draft| draft.banner_url), None);
        assert_eq!(store.snapshot().files.as_slice()[0].banner_url, None);
    }

    #[tokio::test(start_paused = true)]
    async fn icon_change_rewrites_leading_block() {
        let (store, persistence, notifier) = setup();
        let mut editor = mount(&store, &persistence, &notifier);

        editor.set_icon("🌱").expect("icon");
        let heading = extract_icon_and_header(&editor.draft().data);
        assert_eq!(heading.icon, "🌱");
        assert_eq!(heading.header, "Untitled");
        sleep(QUIET * 3).await;

        assert_eq!(persistence.files()[0].icon_id, "🌱");
    }

    #[tokio::test(start_paused = true)]
    async fn file_removed_before_save_is_not_persisted() {
        let (store, persistence, notifier) = setup();
        let mut editor = mount(&store, &persistence, &notifier);

        editor.set_title("Gone soon");
        store.delete_file(&EntityId::new("file-1"));
        sleep(QUIET * 3).await;

        assert_eq!(persistence.calls(EntityKind::File, PersistOp::Update), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retargeted_editor_saves_under_the_new_id() {
        let (store, _, notifier) = setup();
        let confirmed = File {
            id: EntityId::new("srv-1"),
            ..file()
        };
        let persistence = Arc::new(InMemoryPersistence::seeded(Vec::new(), Vec::new(), vec![confirmed.clone()]));
        let mut editor = mount(&store, &persistence, &notifier);

        editor.retarget(&confirmed.id);
        store.confirm_file(&EntityId::new("file-1"), confirmed.clone());
        editor.set_title("Renamed after confirm");
        sleep(QUIET * 3).await;

        assert_eq!(editor.file_id(), confirmed.id);
        assert_eq!(persistence.calls(EntityKind::File, PersistOp::Update), 1);
        assert_eq!(persistence.files()[0].title, "Renamed after confirm");
        let saved = store.snapshot().file(&confirmed.id).cloned().expect("file");
        assert_eq!(saved.title, "Renamed after confirm");
    }

    #[tokio::test]
    async fn mounting_unknown_file_fails() {
        let (store, persistence, notifier) = setup();
        let mounted = FileEditor::mount(&EntityId::new("ghost"), store, persistence, notifier, QUIET);
        assert!(mounted.is_err());
    }

    #[test]
    fn draft_applies_over_latest_file() {
        let mut latest = file();
        latest.in_trash = true;
        let draft = FileDraft {
            title: "New".to_string(),
            icon_id: "🌱".to_string(),
            data: "[]".to_string(),
            banner_url: None,
        };
        let merged = draft.apply_to(&latest);
        assert!(merged.in_trash);
        assert_eq!(merged.title, "New");
    }
}
