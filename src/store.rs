use crate::models::{
    Entity, EntityId, File, Folder, FolderSort, PanelSide, ServerSnapshot, SortKey, SortOrder, Workspace,
};
use crate::panels::PanelState;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Ordered list of entities keyed by id. Mutations never fail.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCollection<T> {
    items: Vec<T>,
}

impl<T> Default for EntityCollection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Entity> EntityCollection<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn add(&mut self, entity: T) {
        self.items.push(entity);
    }

    /// Returns whether an entry was replaced.
    pub fn update(&mut self, entity: T) -> bool {
        match self.items.iter_mut().find(|item| item.id() == entity.id()) {
            Some(slot) => {
                *slot = entity;
                true
            }
            None => false,
        }
    }

    pub fn modify(&mut self, id: &EntityId, change: impl FnOnce(&mut T)) -> bool {
        match self.items.iter_mut().find(|item| item.id() == id) {
            Some(slot) => {
                change(slot);
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: &EntityId) -> Option<T> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(index))
    }

    /// Swaps the entry at `temp_id` for `confirmed` in place, or appends it if the temp entry is gone.
    pub fn confirm(&mut self, temp_id: &EntityId, confirmed: T) {
        self.items.retain(|item| item.id() != confirmed.id() || item.id() == temp_id);
        match self.items.iter_mut().find(|item| item.id() == temp_id) {
            Some(slot) => *slot = confirmed,
            None => self.items.push(confirmed),
        }
    }

    /// Merges a server result set. Server copies overwrite local entries with the
    /// same id; local entries missing from the server set are kept as pending
    /// creates; server-only entries are appended in server order.
    pub fn reconcile(&mut self, server: Vec<T>) -> ReconcileStats {
        let mut server_by_id: HashMap<EntityId, T> = HashMap::with_capacity(server.len());
        let mut server_order = Vec::with_capacity(server.len());
        for entity in server {
            let id = entity.id().clone();
            if server_by_id.insert(id.clone(), entity).is_none() {
                server_order.push(id);
            }
        }

        let mut preserved = Vec::new();
        let mut overwritten = Vec::new();
        for local in self.items.drain(..) {
            match server_by_id.remove(local.id()) {
                Some(server_copy) => overwritten.push(server_copy),
                None => preserved.push(local),
            }
        }
        let added: Vec<T> = server_order
            .into_iter()
            .filter_map(|id| server_by_id.remove(&id))
            .collect();

        let stats = ReconcileStats {
            preserved: preserved.len(),
            overwritten: overwritten.len(),
            added: added.len(),
        };
        self.items = preserved;
        self.items.extend(overwritten);
        self.items.extend(added);
        stats
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub preserved: usize,
    pub overwritten: usize,
    pub added: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub user_id: Option<String>,
    pub workspace_id: Option<EntityId>,
    pub workspaces: EntityCollection<Workspace>,
    pub folders: EntityCollection<Folder>,
    pub files: EntityCollection<File>,
    pub panels: PanelState,
}

impl StoreState {
    pub fn file(&self, id: &EntityId) -> Option<&File> {
        self.files.get(id)
    }

    pub fn folder(&self, id: &EntityId) -> Option<&Folder> {
        self.folders.get(id)
    }

    pub fn workspace(&self, id: &EntityId) -> Option<&Workspace> {
        self.workspaces.get(id)
    }

    pub fn active_folders(&self, sort: FolderSort) -> Vec<&Folder> {
        let mut folders: Vec<&Folder> = self.folders.iter().filter(|folder| !folder.in_trash).collect();
        folders.sort_by(|a, b| compare_folders(a, b, sort));
        folders
    }

    /// Files whose back-reference points at `folder_id`, trash excluded.
    pub fn files_in_folder(&self, folder_id: &EntityId) -> Vec<&File> {
        self.files
            .iter()
            .filter(|file| !file.in_trash && file.folder_id.as_ref() == Some(folder_id))
            .collect()
    }

    pub fn root_files(&self) -> Vec<&File> {
        self.files
            .iter()
            .filter(|file| !file.in_trash && file.folder_id.is_none())
            .collect()
    }

    pub fn trashed_folders(&self) -> Vec<&Folder> {
        self.folders.iter().filter(|folder| folder.in_trash).collect()
    }

    pub fn trashed_files(&self) -> Vec<&File> {
        self.files.iter().filter(|file| file.in_trash).collect()
    }

    /// Case-insensitive title match over files outside the trash. A blank
    /// query matches nothing.
    pub fn search_files(&self, query: &str) -> Vec<&File> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.files
            .iter()
            .filter(|file| !file.in_trash && file.title.to_lowercase().contains(&needle))
            .take(SEARCH_LIMIT)
            .collect()
    }
}

const SEARCH_LIMIT: usize = 10;

fn compare_folders(a: &Folder, b: &Folder, sort: FolderSort) -> Ordering {
    let ordering = match sort.key {
        SortKey::None => return Ordering::Equal,
        SortKey::Name => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
    };
    match sort.order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// Read-only view handed to renderers.
pub type Snapshot = Arc<StoreState>;

/// Shared, injectable state container. Cloning shares the same state.
///
/// Every mutation is applied under the channel lock and publishes one new
/// snapshot, so readers never observe a half-applied change.
#[derive(Clone)]
pub struct AppStore {
    state: Arc<watch::Sender<Snapshot>>,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStore {
    pub fn new() -> Self {
        Self::with_state(StoreState::default())
    }

    pub fn with_state(state: StoreState) -> Self {
        let (sender, _) = watch::channel(Arc::new(state));
        Self {
            state: Arc::new(sender),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.state.borrow())
    }

    /// Receivers are marked changed after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    fn mutate<R>(&self, change: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut result = None;
        self.state.send_modify(|snapshot| {
            result = Some(change(Arc::make_mut(snapshot)));
        });
        match result {
            Some(result) => result,
            None => unreachable!("send_modify always runs its closure"),
        }
    }

    pub fn add_file(&self, file: File) {
        tracing::debug!(file_id = %file.id, "store add file");
        self.mutate(|state| state.files.add(file));
    }

    pub fn update_file(&self, file: File) -> bool {
        self.mutate(|state| state.files.update(file))
    }

    pub fn update_file_banner(&self, file_id: &EntityId, banner_url: Option<String>) -> bool {
        self.mutate(|state| state.files.modify(file_id, |file| file.banner_url = banner_url))
    }

    /// Removes the file and closes any panel slot showing it.
    pub fn delete_file(&self, file_id: &EntityId) -> Option<File> {
        self.mutate(|state| {
            let removed = state.files.delete(file_id);
            if removed.is_some() {
                state.panels.forget_file(file_id);
            }
            removed
        })
    }

    pub fn confirm_file(&self, temp_id: &EntityId, confirmed: File) {
        tracing::debug!(temp_id = %temp_id, file_id = %confirmed.id, "store confirm file");
        self.mutate(|state| {
            state.panels.replace_file(temp_id, &confirmed.id);
            state.files.confirm(temp_id, confirmed);
        });
    }

    pub fn add_folder(&self, folder: Folder) {
        tracing::debug!(folder_id = %folder.id, "store add folder");
        self.mutate(|state| state.folders.add(folder));
    }

    pub fn update_folder(&self, folder: Folder) -> bool {
        self.mutate(|state| state.folders.update(folder))
    }

    pub fn delete_folder(&self, folder_id: &EntityId) -> Option<Folder> {
        self.mutate(|state| state.folders.delete(folder_id))
    }

    /// Removes a folder together with the files that reference it.
    pub fn delete_folder_with_files(&self, folder_id: &EntityId) -> (Option<Folder>, Vec<File>) {
        self.mutate(|state| {
            let folder = state.folders.delete(folder_id);
            let file_ids: Vec<EntityId> = state
                .files
                .iter()
                .filter(|file| file.folder_id.as_ref() == Some(folder_id))
                .map(|file| file.id.clone())
                .collect();
            let mut files = Vec::with_capacity(file_ids.len());
            for file_id in file_ids {
                if let Some(file) = state.files.delete(&file_id) {
                    state.panels.forget_file(&file_id);
                    files.push(file);
                }
            }
            (folder, files)
        })
    }

    pub fn restore_folder_with_files(&self, folder: Folder, files: Vec<File>) {
        self.mutate(|state| {
            state.folders.add(folder);
            for file in files {
                state.files.add(file);
            }
        });
    }

    pub fn confirm_folder(&self, temp_id: &EntityId, confirmed: Folder) {
        tracing::debug!(temp_id = %temp_id, folder_id = %confirmed.id, "store confirm folder");
        self.mutate(|state| state.folders.confirm(temp_id, confirmed));
    }

    pub fn add_workspace(&self, workspace: Workspace) {
        self.mutate(|state| state.workspaces.add(workspace));
    }

    pub fn update_workspace(&self, workspace: Workspace) -> bool {
        self.mutate(|state| state.workspaces.update(workspace))
    }

    pub fn delete_workspace(&self, workspace_id: &EntityId) -> Option<Workspace> {
        self.mutate(|state| state.workspaces.delete(workspace_id))
    }

    pub fn confirm_workspace(&self, temp_id: &EntityId, confirmed: Workspace) {
        self.mutate(|state| state.workspaces.confirm(temp_id, confirmed));
    }

    /// Folds a fresh server snapshot into the store without dropping pending creates.
    pub fn reconcile(&self, snapshot: ServerSnapshot) {
        self.mutate(|state| {
            state.user_id = snapshot.user_id;
            state.workspace_id = snapshot.workspace_id;
            if let Some(workspaces) = snapshot.workspaces {
                let stats = state.workspaces.reconcile(workspaces);
                log_reconcile("workspaces", stats);
            }
            if let Some(folders) = snapshot.folders {
                let stats = state.folders.reconcile(folders);
                log_reconcile("folders", stats);
            }
            if let Some(files) = snapshot.files {
                let stats = state.files.reconcile(files);
                log_reconcile("files", stats);
            }
        });
    }

    pub fn set_split_view(&self, is_split: bool) {
        self.mutate(|state| state.panels.set_split_view(is_split));
    }

    pub fn set_focused_panel(&self, side: PanelSide) {
        self.mutate(|state| state.panels.set_focused_panel(side));
    }

    pub fn set_panel_file(&self, side: PanelSide, file_id: EntityId) {
        self.mutate(|state| state.panels.set_panel_file(side, file_id));
    }

    pub fn open_file(&self, file_id: EntityId) {
        self.mutate(|state| state.panels.open_file(file_id));
    }

    pub fn open_beside(&self, file_id: EntityId) {
        self.mutate(|state| state.panels.open_beside(file_id));
    }

    pub fn close_panel(&self, side: PanelSide) {
        self.mutate(|state| state.panels.close_panel(side));
    }
}

fn log_reconcile(collection: &str, stats: ReconcileStats) {
    tracing::debug!(
        collection,
        preserved = stats.preserved,
        overwritten = stats.overwritten,
        added = stats.added,
        "reconciled server snapshot"
    );
}
