use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque entity identifier. Server ids are UUIDs, but nothing here relies on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of an entity created through an optimistic flow.
///
/// Creation starts `Pending` with a client-generated id and moves to
/// `Confirmed` once the backend returns its own id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Pending { temp_id: EntityId },
    Confirmed { server_id: EntityId },
}

impl Identity {
    pub fn pending() -> Self {
        Self::Pending {
            temp_id: EntityId::generate(),
        }
    }

    pub fn id(&self) -> &EntityId {
        match self {
            Self::Pending { temp_id } => temp_id,
            Self::Confirmed { server_id } => server_id,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn confirm(self, server_id: EntityId) -> Self {
        Self::Confirmed { server_id }
    }
}

pub trait Entity: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;
    fn set_id(&mut self, id: EntityId);
    fn in_trash(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Workspace,
    Folder,
    File,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Folder => "folder",
            Self::File => "file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: EntityId,
    pub title: String,
    pub icon_id: String,
    pub banner_url: Option<String>,
    pub workspace_owner_id: String,
    pub in_trash: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: EntityId,
    pub title: String,
    pub icon_id: String,
    pub banner_url: Option<String>,
    pub workspace_id: EntityId,
    pub in_trash: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: EntityId,
    pub title: String,
    pub icon_id: String,
    /// Serialized block-editor content.
    pub data: Option<String>,
    pub banner_url: Option<String>,
    pub workspace_id: EntityId,
    /// `None` places the file at the workspace root.
    pub folder_id: Option<EntityId>,
    pub in_trash: bool,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

impl Entity for Workspace {
    const KIND: EntityKind = EntityKind::Workspace;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn in_trash(&self) -> bool {
        self.in_trash
    }
}

impl Entity for Folder {
    const KIND: EntityKind = EntityKind::Folder;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn in_trash(&self) -> bool {
        self.in_trash
    }
}

impl Entity for File {
    const KIND: EntityKind = EntityKind::File;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn in_trash(&self) -> bool {
        self.in_trash
    }
}

/// Fresh server state for one workspace scope. `None` collections are left alone on reconcile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSnapshot {
    pub user_id: Option<String>,
    pub workspace_id: Option<EntityId>,
    pub workspaces: Option<Vec<Workspace>>,
    pub folders: Option<Vec<Folder>>,
    pub files: Option<Vec<File>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PanelSide {
    Left,
    Right,
}

impl PanelSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// The editor's single save unit: all fields persist together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDraft {
    pub title: String,
    pub icon_id: String,
    pub data: String,
    pub banner_url: Option<String>,
}

impl FileDraft {
    pub fn from_file(file: &File) -> Self {
        Self {
            title: file.title.clone(),
            icon_id: file.icon_id.clone(),
            data: file.data.clone().unwrap_or_default(),
            banner_url: file.banner_url.clone(),
        }
    }

    pub fn apply_to(&self, file: &File) -> File {
        File {
            title: self.title.clone(),
            icon_id: self.icon_id.clone(),
            data: Some(self.data.clone()),
            banner_url: self.banner_url.clone(),
            ..file.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    None,
    Name,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSort {
    pub key: SortKey,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub autosave_quiet_period_ms: u64,
    pub min_folder_title_len: usize,
    pub folder_sort: FolderSort,
    pub last_visited_workspace_id: Option<EntityId>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            autosave_quiet_period_ms: 1000,
            min_folder_title_len: 3,
            folder_sort: FolderSort::default(),
            last_visited_workspace_id: None,
        }
    }
}

impl AppSettings {
    pub fn autosave_quiet_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.autosave_quiet_period_ms)
    }
}
