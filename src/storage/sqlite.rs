use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use tracing::debug;

use crate::asset::{AspectRatio, AssetId, GeneratedAsset, ImageData};
use crate::errors::StorageError;

use super::AssetStore;

/// SQLite-backed asset vault.
///
/// The connection sits behind `Arc<Mutex>` and every query runs on tokio's
/// blocking pool, so synchronous SQLite I/O never stalls async workers.
#[derive(Clone)]
pub struct SqliteAssetStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAssetStore {
    /// Open (or create) the vault at `path` and run migrations.
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory vault (for tests).
    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS assets (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                parent_id TEXT,
                evolution_step INTEGER NOT NULL,
                prompt TEXT NOT NULL,
                model_used TEXT NOT NULL,
                aspect_ratio TEXT NOT NULL,
                created_at TEXT NOT NULL,
                image BLOB NOT NULL,
                image_mime TEXT NOT NULL,
                original_image BLOB NOT NULL,
                original_mime TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure with the connection on a blocking thread.
    async fn call<F, R>(&self, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&Connection) -> Result<R, StorageError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StorageError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    pub async fn count(&self) -> Result<usize, StorageError> {
        self.call(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }
}

fn corrupt(id: &str, message: impl Into<String>) -> StorageError {
    StorageError::Corrupt {
        id: id.to_string(),
        message: message.into(),
    }
}

struct AssetRow {
    id: String,
    parent_id: Option<String>,
    evolution_step: i64,
    prompt: String,
    model_used: String,
    aspect_ratio: String,
    created_at: String,
    image: Vec<u8>,
    image_mime: String,
    original_image: Vec<u8>,
    original_mime: String,
}

impl AssetRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            evolution_step: row.get(2)?,
            prompt: row.get(3)?,
            model_used: row.get(4)?,
            aspect_ratio: row.get(5)?,
            created_at: row.get(6)?,
            image: row.get(7)?,
            image_mime: row.get(8)?,
            original_image: row.get(9)?,
            original_mime: row.get(10)?,
        })
    }

    fn into_asset(self) -> Result<GeneratedAsset, StorageError> {
        let id = AssetId::from_str(&self.id).map_err(|e| corrupt(&self.id, e.to_string()))?;
        let parent_id = self
            .parent_id
            .as_deref()
            .map(AssetId::from_str)
            .transpose()
            .map_err(|e| corrupt(&self.id, format!("parent_id: {}", e)))?;
        let evolution_step = u32::try_from(self.evolution_step)
            .ok()
            .filter(|step| *step >= 1)
            .ok_or_else(|| corrupt(&self.id, format!("evolution_step {}", self.evolution_step)))?;
        let aspect_ratio =
            AspectRatio::from_str(&self.aspect_ratio).map_err(|e| corrupt(&self.id, e))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt(&self.id, format!("created_at: {}", e)))?
            .with_timezone(&Utc);
        Ok(GeneratedAsset {
            id,
            image: ImageData::new(self.image_mime, self.image),
            original_image: ImageData::new(self.original_mime, self.original_image),
            parent_id,
            evolution_step,
            prompt: self.prompt,
            created_at,
            model_used: self.model_used,
            aspect_ratio,
        })
    }
}

#[async_trait]
impl AssetStore for SqliteAssetStore {
    async fn save(&self, asset: &GeneratedAsset) -> Result<(), StorageError> {
        let asset = asset.clone();
        self.call(move |conn| {
            // Assets are immutable, so a repeated save of the same id is a no-op.
            conn.execute(
                "INSERT INTO assets (id, parent_id, evolution_step, prompt, model_used, aspect_ratio,
                                     created_at, image, image_mime, original_image, original_mime)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    asset.id.to_string(),
                    asset.parent_id.map(|p| p.to_string()),
                    i64::from(asset.evolution_step),
                    asset.prompt,
                    asset.model_used,
                    asset.aspect_ratio.as_str(),
                    asset.created_at.to_rfc3339(),
                    asset.image.bytes(),
                    asset.image.mime_type(),
                    asset.original_image.bytes(),
                    asset.original_image.mime_type(),
                ],
            )?;
            debug!(id = %asset.id, "asset saved");
            Ok(())
        })
        .await
    }

    async fn load_all(&self) -> Result<Vec<GeneratedAsset>, StorageError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, parent_id, evolution_step, prompt, model_used, aspect_ratio,
                        created_at, image, image_mime, original_image, original_mime
                 FROM assets ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map([], AssetRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(AssetRow::into_asset).collect()
        })
        .await
    }

    async fn delete(&self, id: &AssetId) -> Result<(), StorageError> {
        let id = id.to_string();
        self.call(move |conn| {
            let removed = conn.execute("DELETE FROM assets WHERE id = ?1", params![id])?;
            debug!(id = %id, removed, "asset delete");
            Ok(())
        })
        .await
    }
}
