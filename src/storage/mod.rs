//! The storage collaborator: the asset vault.

pub mod sqlite;

use async_trait::async_trait;

use crate::asset::{AssetId, GeneratedAsset};
use crate::errors::StorageError;

pub use sqlite::SqliteAssetStore;

/// Persistence for generated assets.
///
/// `load_all` is called once at bootstrap and must return assets in the order
/// they were saved. Deleting an unknown id succeeds.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn save(&self, asset: &GeneratedAsset) -> Result<(), StorageError>;
    async fn load_all(&self) -> Result<Vec<GeneratedAsset>, StorageError>;
    async fn delete(&self, id: &AssetId) -> Result<(), StorageError>;
}
