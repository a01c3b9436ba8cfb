pub mod memory;
pub mod mongo;
pub mod rest;

use crate::models::{AccessScope, EmergencyContact};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryContactStore;
pub use mongo::MongoContactStore;
pub use rest::RestContactStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Contact not found: {0}")]
    NotFound(String),
}

/// Remote collection of emergency contacts keyed by owner.
///
/// Every call runs under the caller's [`AccessScope`]; backends that enforce
/// row-level access authorize with its token.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// All contacts owned by `scope.user_id`.
    async fn list_for_owner(
        &self,
        scope: &AccessScope,
    ) -> Result<Vec<EmergencyContact>, StoreError>;

    async fn insert(
        &self,
        scope: &AccessScope,
        contact: EmergencyContact,
    ) -> Result<EmergencyContact, StoreError>;

    /// Removes `contact_id` only if it belongs to `scope.user_id`.
    async fn delete(&self, scope: &AccessScope, contact_id: &str) -> Result<(), StoreError>;
}
