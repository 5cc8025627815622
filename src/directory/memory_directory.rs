use super::{
    directory_models::{DirectorySeed, ProductSummary, UserSummary},
    Directory,
};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    users: Arc<DashMap<Uuid, UserSummary>>,
    products: Arc<DashMap<Uuid, ProductSummary>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let directory = Self::new();
        for user in seed.users {
            directory.insert_user(user);
        }
        for product in seed.products {
            directory.insert_product(product);
        }
        directory
    }

    pub fn insert_user(&self, user: UserSummary) {
        self.users.insert(user.id, user);
    }

    pub fn insert_product(&self, product: ProductSummary) {
        self.products.insert(product.id, product);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn user(&self, user_id: Uuid) -> Result<Option<UserSummary>> {
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn users(&self, user_ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|u| u.value().clone()))
            .collect())
    }

    async fn product(&self, product_id: Uuid) -> Result<Option<ProductSummary>> {
        Ok(self.products.get(&product_id).map(|p| p.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_lookup() {
        let user_id = Uuid::new_v4();
        let seed: DirectorySeed = serde_json::from_value(serde_json::json!({
            "users": [{
                "id": user_id,
                "name": "Ada",
                "role": "seller",
                "store_name": "Ada's Assets",
                "profile_image": null
            }]
        }))
        .unwrap();

        let directory = InMemoryDirectory::from_seed(seed);
        let user = directory.user(user_id).await.unwrap().unwrap();
        assert_eq!(user.store_name.as_deref(), Some("Ada's Assets"));
        assert!(directory.product(Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(directory.users(&[user_id, Uuid::new_v4()]).await.unwrap().len(), 1);
    }
}
