use super::{ContactStore, StoreError};
use crate::models::{AccessScope, EmergencyContact};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::doc, options::IndexOptions, Client as MongoClient, Collection, Database, IndexModel,
};
use safety_core::error::AppError;

#[derive(Clone)]
pub struct MongoContactStore {
    db: Database,
    collection: String,
}

impl MongoContactStore {
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB contact store");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        Ok(Self {
            db: client.database(database),
            collection: collection.to_string(),
        })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        let owner_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_id_idx".to_string())
                    .build(),
            )
            .build();

        self.contacts()
            .create_index(owner_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create user_id index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .name("contact_id_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.contacts().create_index(id_index, None).await?;

        Ok(())
    }

    fn contacts(&self) -> Collection<EmergencyContact> {
        self.db.collection(&self.collection)
    }
}

fn store_error(e: mongodb::error::Error) -> StoreError {
    StoreError::Connection(e.to_string())
}

#[async_trait]
impl ContactStore for MongoContactStore {
    async fn list_for_owner(
        &self,
        scope: &AccessScope,
    ) -> Result<Vec<EmergencyContact>, StoreError> {
        let cursor = self
            .contacts()
            .find(doc! { "user_id": scope.user_id.as_str() }, None)
            .await
            .map_err(store_error)?;

        cursor
            .try_collect()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn insert(
        &self,
        _scope: &AccessScope,
        contact: EmergencyContact,
    ) -> Result<EmergencyContact, StoreError> {
        self.contacts()
            .insert_one(&contact, None)
            .await
            .map_err(store_error)?;
        Ok(contact)
    }

    async fn delete(&self, scope: &AccessScope, contact_id: &str) -> Result<(), StoreError> {
        let filter = doc! { "id": contact_id, "user_id": scope.user_id.as_str() };
        let result = self
            .contacts()
            .delete_one(filter, None)
            .await
            .map_err(store_error)?;

        if result.deleted_count == 0 {
            return Err(StoreError::NotFound(contact_id.to_string()));
        }
        Ok(())
    }
}
