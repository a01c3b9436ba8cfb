//! Session lifecycle observation.
//!
//! A [`SessionWatcher`] owns one subscription to a [`SessionSource`] and turns
//! raw auth notifications into [`SessionEvent`]s. The subscription is released
//! when the watcher is dropped, on every exit path.
//!
//! A session also ends when it expires without any notification; the watcher
//! keeps the expiry of the session it last reported so its owner can time out.

use crate::models::{AccessScope, AuthChangeEvent, AuthNotification, Session, SessionEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

const NOTIFICATION_BUFFER: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Subscription lagged, {0} notifications dropped")]
    Lagged(u64),

    #[error("Session source closed")]
    Closed,
}

/// Authentication session source contract.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// One-shot lookup of the current session. Lookup failures read as absent.
    async fn current_session(&self) -> Option<Session>;

    /// Starts delivering notifications until the subscription is dropped.
    fn subscribe(&self) -> SessionSubscription;
}

/// Live subscription handle; unsubscribes on drop.
pub struct SessionSubscription {
    receiver: broadcast::Receiver<AuthNotification>,
    on_release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SessionSubscription {
    pub fn new(
        receiver: broadcast::Receiver<AuthNotification>,
        on_release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            receiver,
            on_release: Some(Box::new(on_release)),
        }
    }

    pub async fn recv(&mut self) -> Result<AuthNotification, SubscriptionError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(n) => SubscriptionError::Lagged(n),
            broadcast::error::RecvError::Closed => SubscriptionError::Closed,
        })
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(on_release) = self.on_release.take() {
            on_release();
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// In-process session source, the local side of the auth client: the host
/// pushes sign-in, refresh and sign-out through it.
#[derive(Clone)]
pub struct LocalSessionSource {
    current: Arc<RwLock<Option<Session>>>,
    sender: broadcast::Sender<AuthNotification>,
    subscribers: Arc<AtomicUsize>,
}

impl Default for LocalSessionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSessionSource {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            current: Arc::new(RwLock::new(None)),
            sender,
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_session(session: Session) -> Self {
        let source = Self::new();
        source.store(Some(session));
        source
    }

    pub fn sign_in(&self, session: Session) {
        self.emit(AuthChangeEvent::SignedIn, Some(session));
    }

    pub fn refresh(&self, session: Session) {
        self.emit(AuthChangeEvent::TokenRefreshed, Some(session));
    }

    pub fn sign_out(&self) {
        self.emit(AuthChangeEvent::SignedOut, None);
    }

    /// Stores `session` as current and notifies every subscriber.
    pub fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        self.store(session.clone());
        tracing::debug!(%event, "Auth state change");
        // No subscribers is fine; the stored session still answers lookups.
        let _ = self.sender.send(AuthNotification { event, session });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    fn store(&self, session: Option<Session>) {
        if let Ok(mut current) = self.current.write() {
            *current = session;
        }
    }
}

#[async_trait]
impl SessionSource for LocalSessionSource {
    async fn current_session(&self) -> Option<Session> {
        self.current.read().ok().and_then(|current| current.clone())
    }

    fn subscribe(&self) -> SessionSubscription {
        self.subscribers.fetch_add(1, Ordering::SeqCst);
        let subscribers = self.subscribers.clone();
        SessionSubscription::new(self.sender.subscribe(), move || {
            subscribers.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

pub struct SessionWatcher {
    source: Arc<dyn SessionSource>,
    subscription: SessionSubscription,
    expires_at: Option<DateTime<Utc>>,
}

impl SessionWatcher {
    /// Subscribes before anything else so no change between the initial
    /// lookup and the first notification is missed.
    pub fn start(source: Arc<dyn SessionSource>) -> Self {
        let subscription = source.subscribe();
        Self {
            source,
            subscription,
            expires_at: None,
        }
    }

    pub async fn initial(&mut self) -> SessionEvent {
        let session = self.source.current_session().await;
        self.observe(session.as_ref())
    }

    /// Waits for the next lifecycle event. `None` once the source is gone.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        match self.subscription.recv().await {
            Ok(notification) => {
                tracing::debug!(event = %notification.event, "Session notification received");
                Some(self.observe(notification.session.as_ref()))
            }
            Err(SubscriptionError::Lagged(missed)) => {
                tracing::warn!(missed, "Session notifications lagged, re-reading current session");
                Some(self.initial().await)
            }
            Err(SubscriptionError::Closed) => None,
        }
    }

    /// When the session last reported as authenticated runs out.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// [`Self::expires_at`] on the tokio clock, for use with `sleep_until`.
    pub fn expiry_deadline(&self) -> Option<Instant> {
        let remaining = (self.expires_at? - Utc::now()).to_std().unwrap_or_default();
        Some(Instant::now() + remaining)
    }

    /// The held session ran out without a notification.
    pub fn expire(&mut self) -> SessionEvent {
        tracing::info!(expires_at = ?self.expires_at, "Session expired");
        self.expires_at = None;
        SessionEvent::Unauthenticated
    }

    fn observe(&mut self, session: Option<&Session>) -> SessionEvent {
        let event = Self::classify(session);
        self.expires_at = match (&event, session) {
            (SessionEvent::Authenticated(_), Some(session)) => Some(session.expires_at),
            _ => None,
        };
        event
    }

    pub fn classify(session: Option<&Session>) -> SessionEvent {
        Self::classify_at(session, Utc::now())
    }

    pub fn classify_at(session: Option<&Session>, now: DateTime<Utc>) -> SessionEvent {
        match session {
            Some(session) if session.is_valid_at(now) => {
                SessionEvent::Authenticated(AccessScope::from(session))
            }
            _ => SessionEvent::Unauthenticated,
        }
    }
}
