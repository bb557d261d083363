use crate::errors::{AppError, AppResult};
use crate::models::{Entity, EntityId, EntityKind, File, Folder, ServerSnapshot, Workspace};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Backing store for confirmed entities. Creates assign the authoritative id.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn create_workspace(&self, workspace: Workspace) -> AppResult<Workspace>;
    async fn update_workspace(&self, workspace: Workspace) -> AppResult<Workspace>;
    async fn delete_workspace(&self, workspace_id: &EntityId) -> AppResult<()>;

    async fn create_folder(&self, folder: Folder) -> AppResult<Folder>;
    async fn update_folder(&self, folder: Folder) -> AppResult<Folder>;
    async fn delete_folder(&self, folder_id: &EntityId) -> AppResult<()>;

    async fn create_file(&self, file: File) -> AppResult<File>;
    async fn update_file(&self, file: File) -> AppResult<File>;
    async fn delete_file(&self, file_id: &EntityId) -> AppResult<()>;

    async fn load_workspace(&self, workspace_id: &EntityId) -> AppResult<ServerSnapshot>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistOp {
    Create,
    Update,
    Delete,
    Load,
}

#[derive(Default)]
struct MemoryState {
    workspaces: Vec<Workspace>,
    folders: Vec<Folder>,
    files: Vec<File>,
    queued_ids: VecDeque<EntityId>,
    failures: HashSet<(EntityKind, PersistOp)>,
    load_failure: bool,
    calls: HashMap<(EntityKind, PersistOp), usize>,
}

impl MemoryState {
    fn next_id(&mut self) -> EntityId {
        self.queued_ids.pop_front().unwrap_or_else(EntityId::generate)
    }

    fn begin(&mut self, kind: EntityKind, op: PersistOp) -> AppResult<()> {
        *self.calls.entry((kind, op)).or_insert(0) += 1;
        if self.failures.remove(&(kind, op)) {
            return Err(AppError::Persistence(format!(
                "injected {:?} failure for {}",
                op,
                kind.as_str()
            )));
        }
        Ok(())
    }
}

/// Map-backed persistence with id queueing and one-shot failure injection.
#[derive(Default)]
pub struct InMemoryPersistence {
    state: Mutex<MemoryState>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(workspaces: Vec<Workspace>, folders: Vec<Folder>, files: Vec<File>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                workspaces,
                folders,
                files,
                ..MemoryState::default()
            }),
        }
    }

    /// The next create returns `id` instead of a fresh UUID.
    pub fn queue_server_id(&self, id: impl Into<EntityId>) {
        if let Ok(mut state) = self.state.lock() {
            state.queued_ids.push_back(id.into());
        }
    }

    /// The next `op` on `kind` fails once.
    pub fn fail_next(&self, kind: EntityKind, op: PersistOp) {
        if let Ok(mut state) = self.state.lock() {
            if op == PersistOp::Load {
                state.load_failure = true;
            } else {
                state.failures.insert((kind, op));
            }
        }
    }

    pub fn calls(&self, kind: EntityKind, op: PersistOp) -> usize {
        self.state
            .lock()
            .map(|state| state.calls.get(&(kind, op)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn files(&self) -> Vec<File> {
        self.state.lock().map(|state| state.files.clone()).unwrap_or_default()
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.state.lock().map(|state| state.folders.clone()).unwrap_or_default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("persistence mutex poisoned".to_string()))
    }
}

fn insert<T: Entity>(items: &mut Vec<T>, mut entity: T, id: EntityId) -> T {
    entity.set_id(id);
    items.push(entity.clone());
    entity
}

fn replace<T: Entity>(items: &mut [T], entity: T) -> AppResult<T> {
    let slot = items
        .iter_mut()
        .find(|item| item.id() == entity.id())
        .ok_or_else(|| AppError::NotFound(format!("{} {}", T::KIND.as_str(), entity.id())))?;
    *slot = entity.clone();
    Ok(entity)
}

fn remove<T: Entity>(items: &mut Vec<T>, id: &EntityId) -> AppResult<()> {
    let before = items.len();
    items.retain(|item| item.id() != id);
    if items.len() == before {
        return Err(AppError::NotFound(format!("{} {}", T::KIND.as_str(), id)));
    }
    Ok(())
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn create_workspace(&self, workspace: Workspace) -> AppResult<Workspace> {
        let mut state = self.lock()?;
        state.begin(EntityKind::Workspace, PersistOp::Create)?;
        let id = state.next_id();
        Ok(insert(&mut state.workspaces, workspace, id))
    }

    async fn update_workspace(&self, workspace: Workspace) -> AppResult<Workspace> {
        let mut state = self.lock()?;
        state.begin(EntityKind::Workspace, PersistOp::Update)?;
        replace(&mut state.workspaces, workspace)
    }

    async fn delete_workspace(&self, workspace_id: &EntityId) -> AppResult<()> {
        let mut state = self.lock()?;
        state.begin(EntityKind::Workspace, PersistOp::Delete)?;
        remove(&mut state.workspaces, workspace_id)?;
        state.folders.retain(|folder| &folder.workspace_id != workspace_id);
        state.files.retain(|file| &file.workspace_id != workspace_id);
        Ok(())
    }

    async fn create_folder(&self, folder: Folder) -> AppResult<Folder> {
        let mut state = self.lock()?;
        state.begin(EntityKind::Folder, PersistOp::Create)?;
        let id = state.next_id();
        Ok(insert(&mut state.folders, folder, id))
    }

    async fn update_folder(&self, folder: Folder) -> AppResult<Folder> {
        let mut state = self.lock()?;
        state.begin(EntityKind::Folder, PersistOp::Update)?;
        replace(&mut state.folders, folder)
    }

    async fn delete_folder(&self, folder_id: &EntityId) -> AppResult<()> {
        let mut state = self.lock()?;
        state.begin(EntityKind::Folder, PersistOp::Delete)?;
        remove(&mut state.folders, folder_id)?;
        state.files.retain(|file| file.folder_id.as_ref() != Some(folder_id));
        Ok(())
    }

    async fn create_file(&self, file: File) -> AppResult<File> {
        let mut state = self.lock()?;
        state.begin(EntityKind::File, PersistOp::Create)?;
        let id = state.next_id();
        Ok(insert(&mut state.files, file, id))
    }

    async fn update_file(&self, file: File) -> AppResult<File> {
        let mut state = self.lock()?;
        state.begin(EntityKind::File, PersistOp::Update)?;
        replace(&mut state.files, file)
    }

    async fn delete_file(&self, file_id: &EntityId) -> AppResult<()> {
        let mut state = self.lock()?;
        state.begin(EntityKind::File, PersistOp::Delete)?;
        remove(&mut state.files, file_id)
    }

    async fn load_workspace(&self, workspace_id: &EntityId) -> AppResult<ServerSnapshot> {
        let mut state = self.lock()?;
        *state
            .calls
            .entry((EntityKind::Workspace, PersistOp::Load))
            .or_insert(0) += 1;
        if std::mem::take(&mut state.load_failure) {
            return Err(AppError::Persistence("injected load failure".to_string()));
        }
        let Some(owner_id) = state
            .workspaces
            .iter()
            .find(|workspace| &workspace.id == workspace_id)
            .map(|workspace| workspace.workspace_owner_id.clone())
        else {
            return Err(AppError::NotFound(format!("workspace {}", workspace_id)));
        };
        Ok(ServerSnapshot {
            user_id: Some(owner_id),
            workspace_id: Some(workspace_id.clone()),
            workspaces: Some(state.workspaces.clone()),
            folders: Some(
                state
                    .folders
                    .iter()
                    .filter(|folder| &folder.workspace_id == workspace_id)
                    .cloned()
                    .collect(),
            ),
            files: Some(
                state
                    .files
                    .iter()
                    .filter(|file| &file.workspace_id == workspace_id)
                    .cloned()
                    .collect(),
            ),
        })
    }
}
