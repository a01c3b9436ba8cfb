//! Event-driven activation controller.
//!
//! One task owns the [`ActivationGate`] and is the only place that mutates it.
//! Session notifications, caller commands and completed probe/sync requests
//! all arrive as messages and are handled one at a time. Permission checks
//! and store calls run as separate tasks and report back with the ticket they
//! were issued; stale results are dropped by the gate. A store write reports
//! back first, and its follow-up read is ticketed only after the write landed.

use crate::config::PolicySettings;
use crate::models::{
    ActivationState, EmergencyContact, NewEmergencyContact, PermissionState, Presentation,
    RequestOutcome, SessionEvent,
};
use crate::services::activation_gate::{
    ActivationGate, RequestKind, SessionChange, SessionKey, Ticket,
};
use crate::services::contact_store::{ContactStore, StoreError};
use crate::services::contact_sync::ContactSync;
use crate::services::notifier::Notifier;
use crate::services::permission_probe::{LocationCapability, PermissionProbe};
use crate::services::readiness::ReadinessPolicy;
use crate::services::session_watcher::{SessionSource, SessionWatcher};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use validator::Validate;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Controller has been disposed")]
    Disposed,

    #[error("No authenticated session")]
    NotAuthenticated,

    #[error("Session changed before the operation completed")]
    SessionChanged,

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Contact store error: {0}")]
    Store(#[from] StoreError),
}

/// External collaborators the controller runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionSource>,
    pub contacts: Arc<dyn ContactStore>,
    pub location: Arc<dyn LocationCapability>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub policy: ReadinessPolicy,
    pub auth_redirect: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        PolicySettings::default().into()
    }
}

impl From<PolicySettings> for ControllerOptions {
    fn from(settings: PolicySettings) -> Self {
        Self {
            policy: settings.readiness_policy(),
            auth_redirect: settings.auth_redirect,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, ControllerError>>;

enum Command {
    ConfirmActivate(Reply<ActivationState>),
    RequestPermission(Reply<RequestOutcome>),
    RefreshPermission(Reply<PermissionState>),
    RefreshContacts(Reply<usize>),
    AddContact(NewEmergencyContact, Reply<EmergencyContact>),
    RemoveContact(String, Reply<()>),
    Shutdown,
}

enum PermissionReply {
    Queried(Reply<PermissionState>),
    Requested(Reply<RequestOutcome>, RequestOutcome),
}

enum ContactsReply {
    Refreshed(Reply<usize>),
    Added(Reply<EmergencyContact>, EmergencyContact),
    Removed(Reply<()>),
}

impl ContactsReply {
    /// Answers the caller with the outcome of the read. A write already
    /// landed, so its caller is told so whatever happened to the read.
    fn send(self, read: Result<usize, ControllerError>) {
        match self {
            ContactsReply::Refreshed(reply) => {
                let _ = reply.send(read);
            }
            ContactsReply::Added(reply, created) => {
                let _ = reply.send(Ok(created));
            }
            ContactsReply::Removed(reply) => {
                let _ = reply.send(Ok(()));
            }
        }
    }
}

enum Completion {
    Permission {
        ticket: Ticket,
        state: PermissionState,
        reply: Option<PermissionReply>,
    },
    Contacts {
        ticket: Ticket,
        contacts: Vec<EmergencyContact>,
        reply: Option<ContactsReply>,
    },
    Written {
        key: SessionKey,
        reply: ContactsReply,
    },
}

/// Caller-side handle. Dropping it disposes the controller.
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    presentation: watch::Receiver<Presentation>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    pub fn presentation(&self) -> Presentation {
        self.presentation.borrow().clone()
    }

    /// Receiver that observes every presentation change.
    pub fn watch(&self) -> watch::Receiver<Presentation> {
        self.presentation.clone()
    }

    /// Waits until the presentation satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&Presentation) -> bool,
    ) -> Result<Presentation, ControllerError> {
        let mut receiver = self.presentation.clone();
        let presentation = receiver
            .wait_for(predicate)
            .await
            .map_err(|_| ControllerError::Disposed)?;
        Ok(presentation.clone())
    }

    /// Latches the session into active monitoring when readiness is
    /// satisfied; otherwise leaves it onboarding. Returns the resulting state.
    pub async fn confirm_activate(&self) -> Result<ActivationState, ControllerError> {
        self.call(Command::ConfirmActivate).await
    }

    pub async fn request_permission(&self) -> Result<RequestOutcome, ControllerError> {
        self.call(Command::RequestPermission).await
    }

    pub async fn refresh_permission(&self) -> Result<PermissionState, ControllerError> {
        self.call(Command::RefreshPermission).await
    }

    /// Re-reads the contact list after an outside change. Returns the count.
    pub async fn refresh_contacts(&self) -> Result<usize, ControllerError> {
        self.call(Command::RefreshContacts).await
    }

    pub async fn add_contact(
        &self,
        contact: NewEmergencyContact,
    ) -> Result<EmergencyContact, ControllerError> {
        contact.validate()?;
        self.call(|reply| Command::AddContact(contact, reply)).await
    }

    pub async fn remove_contact(&self, contact_id: &str) -> Result<(), ControllerError> {
        let contact_id = contact_id.to_string();
        self.call(|reply| Command::RemoveContact(contact_id, reply))
            .await
    }

    /// Stops the controller and waits until its session subscription is released.
    pub async fn shutdown(self) {
        // A closed channel means the task is already gone.
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Activation controller task failed");
        }
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ControllerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ControllerError::Disposed)?;
        response.await.map_err(|_| ControllerError::Disposed)?
    }
}

pub struct ActivationController {
    gate: ActivationGate,
    probe: PermissionProbe,
    sync: ContactSync,
    presentation: watch::Sender<Presentation>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl ActivationController {
    /// Subscribes to the session source and starts the controller task.
    pub fn spawn(collaborators: Collaborators, options: ControllerOptions) -> ControllerHandle {
        let watcher = SessionWatcher::start(collaborators.sessions.clone());
        let gate = ActivationGate::new(options.policy, options.auth_redirect);
        let (presentation, presentation_rx) = watch::channel(gate.presentation());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let controller = Self {
            gate,
            probe: PermissionProbe::new(collaborators.location, collaborators.notifier),
            sync: ContactSync::new(collaborators.contacts),
            presentation,
            completions: completions_tx,
        };

        let task = tokio::spawn(controller.run(watcher, commands_rx, completions_rx));

        ControllerHandle {
            commands: commands_tx,
            presentation: presentation_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut watcher: SessionWatcher,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        let initial = watcher.initial().await;
        self.on_session(initial);

        let mut watching = true;
        loop {
            let expiry = watcher.expiry_deadline();
            tokio::select! {
                event = watcher.next_event(), if watching => match event {
                    Some(event) => self.on_session(event),
                    None => {
                        tracing::warn!("Session source closed, treating as signed out");
                        watching = false;
                        self.on_session(SessionEvent::Unauthenticated);
                    }
                },
                _ = sleep_until(expiry.unwrap_or_else(Instant::now)), if expiry.is_some() => {
                    let event = watcher.expire();
                    self.on_session(event);
                }
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
            }
        }

        tracing::info!("Activation controller stopped, releasing session subscription");
    }

    fn on_session(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Authenticated(scope) => {
                let user_id = scope.user_id.clone();
                match self.gate.authenticate(scope) {
                    SessionChange::Started => tracing::info!(
                        user_id = %user_id,
                        generation = self.gate.generation(),
                        "Session started, onboarding"
                    ),
                    SessionChange::Refreshed => {
                        tracing::debug!(user_id = %user_id, "Session refreshed, re-syncing")
                    }
                }
                self.spawn_permission_query(None);
                self.spawn_contact_fetch(None);
            }
            SessionEvent::Unauthenticated => {
                if let Some(user_id) = self.gate.current_user() {
                    tracing::info!(
                        user_id = %user_id,
                        "Session ended, discarding onboarding state"
                    );
                }
                self.gate.sign_out();
            }
        }
        self.publish();
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::ConfirmActivate(reply) => {
                let before = self.gate.activation();
                let result = match self.gate.confirm_activate() {
                    Some(ActivationState::Active) if before == Some(ActivationState::Active) => {
                        Ok(ActivationState::Active)
                    }
                    Some(ActivationState::Active) => {
                        tracing::info!(
                            user_id = ?self.gate.current_user(),
                            "Safety monitoring activated"
                        );
                        metrics::counter!("activation_confirmed_total").increment(1);
                        Ok(ActivationState::Active)
                    }
                    Some(state) => {
                        tracing::debug!(readiness = ?self.gate.readiness(), "Activation not ready");
                        metrics::counter!("activation_rejected_total").increment(1);
                        Ok(state)
                    }
                    None => Err(ControllerError::NotAuthenticated),
                };
                self.publish();
                let _ = reply.send(result);
            }
            Command::RequestPermission(reply) => self.spawn_permission_request(reply),
            Command::RefreshPermission(reply) => {
                self.spawn_permission_query(Some(reply));
            }
            Command::RefreshContacts(reply) => {
                self.spawn_contact_fetch(Some(ContactsReply::Refreshed(reply)));
            }
            Command::AddContact(contact, reply) => self.spawn_contact_add(contact, reply),
            Command::RemoveContact(contact_id, reply) => {
                self.spawn_contact_remove(contact_id, reply)
            }
            Command::Shutdown => {}
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Permission {
                ticket,
                state,
                reply,
            } => {
                let applied = match &reply {
                    Some(PermissionReply::Requested(..)) => {
                        self.gate.apply_prompted_permission(&ticket, state)
                    }
                    _ => self.gate.apply_permission(&ticket, state),
                };
                if applied {
                    tracing::debug!(
                        user_id = %ticket.user_id(),
                        permission = %state,
                        "Permission resolved"
                    );
                } else {
                    discard_stale(&ticket);
                }
                self.publish();
                match reply {
                    Some(PermissionReply::Queried(reply)) => {
                        let _ = reply.send(if applied {
                            Ok(state)
                        } else {
                            Err(ControllerError::SessionChanged)
                        });
                    }
                    // The user answered the prompt; report that even if the
                    // session moved on.
                    Some(PermissionReply::Requested(reply, outcome)) => {
                        let _ = reply.send(Ok(outcome));
                    }
                    None => {}
                }
            }
            Completion::Contacts {
                ticket,
                contacts,
                reply,
            } => {
                let count = contacts.len();
                let applied = self.gate.apply_contacts(&ticket, contacts);
                if applied {
                    tracing::debug!(user_id = %ticket.user_id(), count, "Contacts resolved");
                } else {
                    discard_stale(&ticket);
                }
                self.publish();
                if let Some(reply) = reply {
                    reply.send(if applied {
                        Ok(count)
                    } else {
                        Err(ControllerError::SessionChanged)
                    });
                }
            }
            Completion::Written { key, reply } => {
                if self.gate.is_session_current(&key) {
                    self.spawn_contact_fetch(Some(reply));
                } else {
                    tracing::debug!(
                        user_id = %key.scope.user_id,
                        generation = key.generation,
                        "Session changed before the write was re-read"
                    );
                    reply.send(Err(ControllerError::SessionChanged));
                }
            }
        }
    }

    fn publish(&self) {
        let next = self.gate.presentation();
        self.presentation.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn ticket<T>(
        &mut self,
        kind: RequestKind,
        reply: Option<Reply<T>>,
    ) -> Option<(Ticket, Option<Reply<T>>)> {
        match self.gate.issue(kind) {
            Some(ticket) => Some((ticket, reply)),
            None => {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(ControllerError::NotAuthenticated));
                }
                None
            }
        }
    }

    fn spawn_permission_query(&mut self, reply: Option<Reply<PermissionState>>) {
        let Some((ticket, reply)) = self.ticket(RequestKind::Permission, reply) else {
            return;
        };
        let probe = self.probe.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let state = probe.query().await;
            let _ = completions.send(Completion::Permission {
                ticket,
                state,
                reply: reply.map(PermissionReply::Queried),
            });
        });
    }

    fn spawn_permission_request(&mut self, reply: Reply<RequestOutcome>) {
        let Some((ticket, Some(reply))) = self.ticket(RequestKind::Permission, Some(reply)) else {
            return;
        };
        let probe = self.probe.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let outcome = probe.request().await;
            let _ = completions.send(Completion::Permission {
                ticket,
                state: outcome.permission(),
                reply: Some(PermissionReply::Requested(reply, outcome)),
            });
        });
    }

    fn spawn_contact_fetch(&mut self, reply: Option<ContactsReply>) {
        let Some(ticket) = self.gate.issue(RequestKind::Contacts) else {
            if let Some(reply) = reply {
                reply.send(Err(ControllerError::NotAuthenticated));
            }
            return;
        };
        let sync = self.sync.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let contacts = sync.fetch(&ticket.scope).await;
            let _ = completions.send(Completion::Contacts {
                ticket,
                contacts,
                reply,
            });
        });
    }

    fn spawn_contact_add(&mut self, contact: NewEmergencyContact, reply: Reply<EmergencyContact>) {
        let Some(key) = self.gate.session_key() else {
            let _ = reply.send(Err(ControllerError::NotAuthenticated));
            return;
        };
        let sync = self.sync.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            match sync.add(&key.scope, contact).await {
                Ok(created) => {
                    let reply = ContactsReply::Added(reply, created);
                    let _ = completions.send(Completion::Written { key, reply });
                }
                Err(e) => {
                    tracing::error!(
                        user_id = %key.scope.user_id,
                        error = %e,
                        "Failed to add emergency contact"
                    );
                    let _ = reply.send(Err(e.into()));
                }
            }
        });
    }

    fn spawn_contact_remove(&mut self, contact_id: String, reply: Reply<()>) {
        let Some(key) = self.gate.session_key() else {
            let _ = reply.send(Err(ControllerError::NotAuthenticated));
            return;
        };
        let sync = self.sync.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            match sync.remove(&key.scope, &contact_id).await {
                Ok(()) => {
                    let reply = ContactsReply::Removed(reply);
                    let _ = completions.send(Completion::Written { key, reply });
                }
                Err(e) => {
                    tracing::error!(
                        user_id = %key.scope.user_id,
                        error = %e,
                        "Failed to remove emergency contact"
                    );
                    let _ = reply.send(Err(e.into()));
                }
            }
        });
    }
}

fn discard_stale(ticket: &Ticket) {
    tracing::debug!(
        user_id = %ticket.user_id(),
        generation = ticket.generation,
        kind = ticket.kind.as_str(),
        "Discarding stale response"
    );
    metrics::counter!("stale_response_discarded_total", "kind" => ticket.kind.as_str())
        .increment(1);
}

