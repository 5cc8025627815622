pub mod directory_models;
pub mod directory_repository;
pub mod memory_directory;

pub use directory_models::{DirectorySeed, ProductSummary, UserSummary};
pub use directory_repository::DirectoryRepository;
pub use memory_directory::InMemoryDirectory;

use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Read-only lookup of users and products owned by other marketplace subsystems.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn user(&self, user_id: Uuid) -> Result<Option<UserSummary>>;

    /// Batch lookup; unknown ids are skipped.
    async fn users(&self, user_ids: &[Uuid]) -> Result<Vec<UserSummary>>;

    async fn product(&self, product_id: Uuid) -> Result<Option<ProductSummary>>;
}
