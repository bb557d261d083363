use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, EntityId, File, Folder, ServerSnapshot, Workspace};
use crate::persistence::Persistence;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const WORKSPACE_COLUMNS: &str = "id, title, icon_id, banner_url, workspace_owner_id, in_trash, created_at";
const FOLDER_COLUMNS: &str = "id, title, icon_id, banner_url, workspace_id, in_trash, created_at";
const FILE_COLUMNS: &str =
    "id, title, icon_id, data, banner_url, workspace_id, folder_id, in_trash, is_published, created_at";

/// SQLite-backed persistence. Server ids are minted here on insert.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };
        db.ensure_default_settings()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn insert_workspace(&self, workspace: &Workspace) -> AppResult<Workspace> {
        let stored = Workspace {
            id: EntityId::generate(),
            ..workspace.clone()
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO workspaces (id, title, icon_id, banner_url, workspace_owner_id, in_trash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                stored.id.as_str(),
                stored.title,
                stored.icon_id,
                stored.banner_url,
                stored.workspace_owner_id,
                stored.in_trash,
                stored.created_at.to_rfc3339(),
            ],
        )?;
        Ok(stored)
    }

    pub fn save_workspace(&self, workspace: &Workspace) -> AppResult<Workspace> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE workspaces SET title = ?1, icon_id = ?2, banner_url = ?3, in_trash = ?4 WHERE id = ?5",
            params![
                workspace.title,
                workspace.icon_id,
                workspace.banner_url,
                workspace.in_trash,
                workspace.id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("workspace {}", workspace.id)));
        }
        query_workspace(&conn, &workspace.id)?
            .ok_or_else(|| AppError::NotFound(format!("workspace {}", workspace.id)))
    }

    pub fn insert_folder(&self, folder: &Folder) -> AppResult<Folder> {
        let stored = Folder {
            id: EntityId::generate(),
            ..folder.clone()
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO folders (id, title, icon_id, banner_url, workspace_id, in_trash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                stored.id.as_str(),
                stored.title,
                stored.icon_id,
                stored.banner_url,
                stored.workspace_id.as_str(),
                stored.in_trash,
                stored.created_at.to_rfc3339(),
            ],
        )?;
        Ok(stored)
    }

    pub fn save_folder(&self, folder: &Folder) -> AppResult<Folder> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE folders SET title = ?1, icon_id = ?2, banner_url = ?3, in_trash = ?4 WHERE id = ?5",
            params![
                folder.title,
                folder.icon_id,
                folder.banner_url,
                folder.in_trash,
                folder.id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("folder {}", folder.id)));
        }
        query_folder(&conn, &folder.id)?.ok_or_else(|| AppError::NotFound(format!("folder {}", folder.id)))
    }

    pub fn insert_file(&self, file: &File) -> AppResult<File> {
        let stored = File {
            id: EntityId::generate(),
            ..file.clone()
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO files (
               id, title, icon_id, data, banner_url, workspace_id, folder_id, in_trash, is_published, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                stored.id.as_str(),
                stored.title,
                stored.icon_id,
                stored.data,
                stored.banner_url,
                stored.workspace_id.as_str(),
                stored.folder_id.as_ref().map(EntityId::as_str),
                stored.in_trash,
                stored.is_published,
                stored.created_at.to_rfc3339(),
            ],
        )?;
        Ok(stored)
    }

    pub fn save_file(&self, file: &File) -> AppResult<File> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE files
             SET title = ?1, icon_id = ?2, data = ?3, banner_url = ?4, folder_id = ?5, in_trash = ?6, is_published = ?7
             WHERE id = ?8",
            params![
                file.title,
                file.icon_id,
                file.data,
                file.banner_url,
                file.folder_id.as_ref().map(EntityId::as_str),
                file.in_trash,
                file.is_published,
                file.id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("file {}", file.id)));
        }
        query_file(&conn, &file.id)?.ok_or_else(|| AppError::NotFound(format!("file {}", file.id)))
    }

    fn remove(&self, table: &str, id: &EntityId) -> AppResult<()> {
        let sql = match table {
            "workspaces" => "DELETE FROM workspaces WHERE id = ?1",
            "folders" => "DELETE FROM folders WHERE id = ?1",
            "files" => "DELETE FROM files WHERE id = ?1",
            other => return Err(AppError::Internal(format!("unknown table '{}'", other))),
        };
        let conn = self.conn()?;
        let changed = conn.execute(sql, [id.as_str()])?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("{} {}", table.trim_end_matches('s'), id)));
        }
        Ok(())
    }

    pub fn workspace_snapshot(&self, workspace_id: &EntityId) -> AppResult<ServerSnapshot> {
        let conn = self.conn()?;
        let workspace = query_workspace(&conn, workspace_id)?
            .ok_or_else(|| AppError::NotFound(format!("workspace {}", workspace_id)))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM workspaces WHERE workspace_owner_id = ?1 ORDER BY created_at ASC",
            WORKSPACE_COLUMNS
        ))?;
        let workspaces = stmt
            .query_map([workspace.workspace_owner_id.as_str()], parse_workspace_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM folders WHERE workspace_id = ?1 ORDER BY created_at ASC",
            FOLDER_COLUMNS
        ))?;
        let folders = stmt
            .query_map([workspace_id.as_str()], parse_folder_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM files WHERE workspace_id = ?1 ORDER BY created_at ASC",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map([workspace_id.as_str()], parse_file_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ServerSnapshot {
            user_id: Some(workspace.workspace_owner_id),
            workspace_id: Some(workspace_id.clone()),
            workspaces: Some(workspaces),
            folders: Some(folders),
            files: Some(files),
        })
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.conn()?;
        let raw = conn
            .query_row("SELECT value_json FROM settings WHERE key = 'app'", [], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;

        match raw {
            Some(raw) => match serde_json::from_str::<AppSettings>(&raw) {
                Ok(settings) => Ok(settings),
                Err(error) => {
                    tracing::warn!(error = %error, "stored settings are malformed; using defaults");
                    Ok(AppSettings::default())
                }
            },
            None => Ok(AppSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: AppSettings = serde_json::from_value(merged)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(&settings)?, Utc::now().to_rfc3339()],
        )?;

        Ok(settings)
    }

    pub fn remember_workspace(&self, workspace_id: &EntityId) -> AppResult<AppSettings> {
        self.update_settings(serde_json::json!({ "lastVisitedWorkspaceId": workspace_id }))
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM settings WHERE key = 'app'", [], |row| row.get(0))?;
        if count == 0 {
            conn.execute(
                "INSERT INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
                params![
                    serde_json::to_string(&AppSettings::default())?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for Database {
    async fn create_workspace(&self, workspace: Workspace) -> AppResult<Workspace> {
        self.insert_workspace(&workspace)
    }

    async fn update_workspace(&self, workspace: Workspace) -> AppResult<Workspace> {
        self.save_workspace(&workspace)
    }

    async fn delete_workspace(&self, workspace_id: &EntityId) -> AppResult<()> {
        self.remove("workspaces", workspace_id)
    }

    async fn create_folder(&self, folder: Folder) -> AppResult<Folder> {
        self.insert_folder(&folder)
    }

    async fn update_folder(&self, folder: Folder) -> AppResult<Folder> {
        self.save_folder(&folder)
    }

    async fn delete_folder(&self, folder_id: &EntityId) -> AppResult<()> {
        self.remove("folders", folder_id)
    }

    async fn create_file(&self, file: File) -> AppResult<File> {
        self.insert_file(&file)
    }

    async fn update_file(&self, file: File) -> AppResult<File> {
        self.save_file(&file)
    }

    async fn delete_file(&self, file_id: &EntityId) -> AppResult<()> {
        self.remove("files", file_id)
    }

    async fn load_workspace(&self, workspace_id: &EntityId) -> AppResult<ServerSnapshot> {
        self.workspace_snapshot(workspace_id)
    }
}

fn query_workspace(conn: &Connection, id: &EntityId) -> AppResult<Option<Workspace>> {
    let sql = format!("SELECT {} FROM workspaces WHERE id = ?1", WORKSPACE_COLUMNS);
    Ok(conn.query_row(&sql, [id.as_str()], parse_workspace_row).optional()?)
}

fn query_folder(conn: &Connection, id: &EntityId) -> AppResult<Option<Folder>> {
    let sql = format!("SELECT {} FROM folders WHERE id = ?1", FOLDER_COLUMNS);
    Ok(conn.query_row(&sql, [id.as_str()], parse_folder_row).optional()?)
}

fn query_file(conn: &Connection, id: &EntityId) -> AppResult<Option<File>> {
    let sql = format!("SELECT {} FROM files WHERE id = ?1", FILE_COLUMNS);
    Ok(conn.query_row(&sql, [id.as_str()], parse_file_row).optional()?)
}

fn parse_workspace_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: EntityId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        icon_id: row.get(2)?,
        banner_url: row.get(3)?,
        workspace_owner_id: row.get(4)?,
        in_trash: row.get(5)?,
        created_at: parse_time(&row.get::<_, String>(6)?)?,
    })
}

fn parse_folder_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: EntityId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        icon_id: row.get(2)?,
        banner_url: row.get(3)?,
        workspace_id: EntityId::new(row.get::<_, String>(4)?),
        in_trash: row.get(5)?,
        created_at: parse_time(&row.get::<_, String>(6)?)?,
    })
}

fn parse_file_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<File> {
    Ok(File {
        id: EntityId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        icon_id: row.get(2)?,
        data: row.get(3)?,
        banner_url: row.get(4)?,
        workspace_id: EntityId::new(row.get::<_, String>(5)?),
        folder_id: row.get::<_, Option<String>>(6)?.map(EntityId::new),
        in_trash: row.get(7)?,
        is_published: row.get(8)?,
        created_at: parse_time(&row.get::<_, String>(9)?)?,
    })
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
