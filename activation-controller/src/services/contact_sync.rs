//! Contact store synchronization scoped to one owner.

use crate::models::{AccessScope, EmergencyContact, NewEmergencyContact};
use crate::services::contact_store::{ContactStore, StoreError};
use std::sync::Arc;

#[derive(Clone)]
pub struct ContactSync {
    store: Arc<dyn ContactStore>,
}

impl ContactSync {
    pub fn new(store: Arc<dyn ContactStore>) -> Self {
        Self { store }
    }

    /// Fetches the owner's contacts. Transport failures degrade to an empty
    /// list; records not owned by the scope's user are dropped.
    pub async fn fetch(&self, scope: &AccessScope) -> Vec<EmergencyContact> {
        let owner = &scope.user_id;
        match self.store.list_for_owner(scope).await {
            Ok(contacts) => {
                let total = contacts.len();
                let scoped: Vec<EmergencyContact> = contacts
                    .into_iter()
                    .filter(|contact| contact.is_owned_by(owner))
                    .collect();
                if scoped.len() != total {
                    tracing::warn!(
                        user_id = %owner,
                        dropped = total - scoped.len(),
                        "Contact store returned records for another owner"
                    );
                }
                metrics::counter!("contact_fetch_total", "status" => "ok").increment(1);
                scoped
            }
            Err(e) => {
                tracing::error!(user_id = %owner, error = %e, "Error fetching emergency contacts");
                metrics::counter!("contact_fetch_total", "status" => "error").increment(1);
                Vec::new()
            }
        }
    }

    pub async fn add(
        &self,
        scope: &AccessScope,
        contact: NewEmergencyContact,
    ) -> Result<EmergencyContact, StoreError> {
        let owner = &scope.user_id;
        let created = self.store.insert(scope, contact.into_contact(owner)).await?;
        tracing::info!(user_id = %owner, contact_id = %created.id, "Emergency contact added");
        Ok(created)
    }

    pub async fn remove(&self, scope: &AccessScope, contact_id: &str) -> Result<(), StoreError> {
        self.store.delete(scope, contact_id).await?;
        tracing::info!(
            user_id = %scope.user_id,
            contact_id = %contact_id,
            "Emergency contact removed"
        );
        Ok(())
    }
}
