use super::{ContactStore, StoreError};
use crate::models::{AccessScope, EmergencyContact, UserId};
use secrecy::ExposeSecret;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::{watch, RwLock};

/// In-memory contact table.
///
/// Reads for an owner can be held open with [`Self::hold`] and writes with
/// [`Self::hold_writes`] to model a slow store. Every call can be failed with
/// [`Self::set_unreachable`].
#[derive(Default)]
pub struct InMemoryContactStore {
    contacts: RwLock<Vec<EmergencyContact>>,
    holds: Mutex<HashMap<UserId, watch::Sender<bool>>>,
    write_hold: Mutex<Option<watch::Sender<bool>>>,
    unreachable: AtomicBool,
    fetch_count: AtomicU64,
    last_token: Mutex<Option<String>>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, contacts: impl IntoIterator<Item = EmergencyContact>) {
        self.contacts.write().await.extend(contacts);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Reads for `owner` started from now on wait until [`Self::release`].
    pub fn hold(&self, owner: &UserId) {
        if let Ok(mut holds) = self.holds.lock() {
            holds.entry(owner.clone()).or_insert_with(|| watch::channel(false).0);
        }
    }

    pub fn release(&self, owner: &UserId) {
        if let Ok(mut holds) = self.holds.lock() {
            if let Some(gate) = holds.remove(owner) {
                gate.send_replace(true);
            }
        }
    }

    /// Inserts and deletes started from now on wait until
    /// [`Self::release_writes`].
    pub fn hold_writes(&self) {
        if let Ok(mut hold) = self.write_hold.lock() {
            hold.get_or_insert_with(|| watch::channel(false).0);
        }
    }

    pub fn release_writes(&self) {
        if let Ok(mut hold) = self.write_hold.lock() {
            if let Some(gate) = hold.take() {
                gate.send_replace(true);
            }
        }
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Access token of the most recent call.
    pub fn last_access_token(&self) -> Option<String> {
        self.last_token.lock().ok().and_then(|token| token.clone())
    }

    fn record(&self, scope: &AccessScope) {
        if let Ok(mut token) = self.last_token.lock() {
            *token = Some(scope.access_token.expose_secret().clone());
        }
    }

    async fn wait_for_writes(&self) {
        let gate = self
            .write_hold
            .lock()
            .ok()
            .and_then(|hold| hold.as_ref().map(|gate| gate.subscribe()));
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("contact store unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn list_for_owner(
        &self,
        scope: &AccessScope,
    ) -> Result<Vec<EmergencyContact>, StoreError> {
        let owner = &scope.user_id;
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.record(scope);

        let gate = self
            .holds
            .lock()
            .ok()
            .and_then(|holds| holds.get(owner).map(|gate| gate.subscribe()));
        if let Some(mut gate) = gate {
            // A dropped sender means the hold was lifted.
            let _ = gate.wait_for(|open| *open).await;
        }

        self.check_reachable()?;
        Ok(self
            .contacts
            .read()
            .await
            .iter()
            .filter(|contact| contact.is_owned_by(owner))
            .cloned()
            .collect())
    }

    async fn insert(
        &self,
        scope: &AccessScope,
        contact: EmergencyContact,
    ) -> Result<EmergencyContact, StoreError> {
        self.record(scope);
        self.wait_for_writes().await;
        self.check_reachable()?;
        self.contacts.write().await.push(contact.clone());
        Ok(contact)
    }

    async fn delete(&self, scope: &AccessScope, contact_id: &str) -> Result<(), StoreError> {
        let owner = &scope.user_id;
        self.record(scope);
        self.wait_for_writes().await;
        self.check_reachable()?;
        let mut contacts = self.contacts.write().await;
        let before = contacts.len();
        contacts.retain(|contact| !(contact.id == contact_id && contact.is_owned_by(owner)));
        if contacts.len() == before {
            return Err(StoreError::NotFound(contact_id.to_string()));
        }
        Ok(())
    }
}
