use activation_controller::models::{
    EmergencyContact, NewEmergencyContact, Presentation, Session, UserId,
};
use activation_controller::services::{
    InMemoryContactStore, LocalSessionSource, MockNotifier, ScriptedLocationCapability,
};
use activation_controller::{
    ActivationController, Collaborators, ControllerHandle, ControllerOptions,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

const SETTLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

pub struct TestController {
    pub sessions: Arc<LocalSessionSource>,
    pub store: Arc<InMemoryContactStore>,
    pub location: Arc<ScriptedLocationCapability>,
    pub notifier: Arc<MockNotifier>,
    pub handle: ControllerHandle,
}

impl TestController {
    /// Controller with no session; the device has not been asked for location yet.
    pub async fn spawn() -> Self {
        Self::spawn_with(
            LocalSessionSource::new(),
            InMemoryContactStore::new(),
            ScriptedLocationCapability::prompting(),
        )
        .await
    }

    pub async fn spawn_signed_in(user: &str) -> Self {
        Self::spawn_with(
            LocalSessionSource::with_session(session(user)),
            InMemoryContactStore::new(),
            ScriptedLocationCapability::prompting(),
        )
        .await
    }

    pub async fn spawn_with(
        sessions: LocalSessionSource,
        store: InMemoryContactStore,
        location: ScriptedLocationCapability,
    ) -> Self {
        let sessions = Arc::new(sessions);
        let store = Arc::new(store);
        let location = Arc::new(location);
        let notifier = Arc::new(MockNotifier::new());

        let handle = ActivationController::spawn(
            Collaborators {
                sessions: sessions.clone(),
                contacts: store.clone(),
                location: location.clone(),
                notifier: notifier.clone(),
            },
            ControllerOptions::default(),
        );

        TestController {
            sessions,
            store,
            location,
            notifier,
            handle,
        }
    }

    /// Waits until the controller has resolved everything for the current session.
    pub async fn settled(&self) -> Presentation {
        self.wait_until(|presentation| match presentation {
            Presentation::Initializing => false,
            Presentation::Onboarding(progress) => progress.synced,
            _ => true,
        })
        .await
    }

    /// Waits until onboarding for the current session has fully synced.
    pub async fn synced(&self) -> Presentation {
        self.wait_until(|presentation| {
            presentation
                .progress()
                .is_some_and(|progress| progress.synced)
        })
        .await
    }

    pub async fn wait_until(&self, predicate: impl FnMut(&Presentation) -> bool) -> Presentation {
        tokio::time::timeout(SETTLE_TIMEOUT, self.handle.wait_for(predicate))
            .await
            .expect("Timed out waiting for presentation")
            .expect("Controller disposed")
    }

    pub async fn seed_contacts(&self, user: &str, count: usize) -> Vec<EmergencyContact> {
        let contacts = contacts_for(user, count);
        self.store.seed(contacts.clone()).await;
        contacts
    }
}

pub fn session(user: &str) -> Session {
    Session::new(user, format!("token-{}", user), Utc::now() + Duration::hours(1))
}

pub fn contacts_for(user: &str, count: usize) -> Vec<EmergencyContact> {
    let owner = UserId::new(user);
    (0..count)
        .map(|i| {
            NewEmergencyContact::new(format!("Contact {}", i + 1), format!("98100000{:02}", i))
                .into_contact(&owner)
        })
        .collect()
}

pub fn contact_count(presentation: &Presentation) -> usize {
    presentation
        .progress()
        .map(|progress| progress.contact_count)
        .expect("Expected onboarding presentation")
}
