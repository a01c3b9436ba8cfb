//! Activation gate: the per-session state machine behind onboarding.
//!
//! The gate owns readiness inputs and the activation state for the current
//! session. Asynchronous results reach it only through [`Ticket`]s issued
//! here, so a result can be matched against the session that asked for it.
//!
//! Reads of one kind are ordered by issue: a read never overwrites the result
//! of a later one. A prompted permission answer is the user's own decision and
//! supersedes every read issued before it resolved. Writes are not ordered;
//! they carry a [`SessionKey`] and their follow-up read gets a ticket only
//! once the write has landed.

use crate::models::{
    AccessScope, ActivationState, EmergencyContact, OnboardingProgress, PermissionState,
    Presentation, ReadinessState, UserId,
};
use crate::services::readiness::ReadinessPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Permission,
    Contacts,
}

impl RequestKind {
    fn index(self) -> usize {
        match self {
            RequestKind::Permission => 0,
            RequestKind::Contacts => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Permission => "permission",
            RequestKind::Contacts => "contacts",
        }
    }
}

/// Identifies one asynchronous request: who asked, in which session, and in
/// what order relative to other requests of the same kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub scope: AccessScope,
    pub generation: u64,
    pub kind: RequestKind,
    pub seq: u64,
}

impl Ticket {
    pub fn user_id(&self) -> &UserId {
        &self.scope.user_id
    }
}

/// The session a write was started in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub scope: AccessScope,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    /// A new session began; all previous state was discarded.
    Started,
    /// The same user re-authenticated; state is kept.
    Refreshed,
}

#[derive(Debug)]
struct SessionState {
    scope: AccessScope,
    generation: u64,
    permission: Option<PermissionState>,
    contacts: Option<Vec<EmergencyContact>>,
    issued: [u64; 2],
    applied: [u64; 2],
    activation: ActivationState,
}

impl SessionState {
    fn new(scope: AccessScope, generation: u64) -> Self {
        Self {
            scope,
            generation,
            permission: None,
            contacts: None,
            issued: [0; 2],
            applied: [0; 2],
            activation: ActivationState::Onboarding,
        }
    }
}

#[derive(Debug)]
pub struct ActivationGate {
    policy: ReadinessPolicy,
    auth_redirect: String,
    generation: u64,
    initialized: bool,
    session: Option<SessionState>,
}

impl ActivationGate {
    pub fn new(policy: ReadinessPolicy, auth_redirect: impl Into<String>) -> Self {
        Self {
            policy,
            auth_redirect: auth_redirect.into(),
            generation: 0,
            initialized: false,
            session: None,
        }
    }

    pub fn policy(&self) -> ReadinessPolicy {
        self.policy
    }

    pub fn current_user(&self) -> Option<&UserId> {
        self.session.as_ref().map(|session| &session.scope.user_id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Same user keeps the session and picks up the rotated token; anyone
    /// else starts a new one.
    pub fn authenticate(&mut self, scope: AccessScope) -> SessionChange {
        self.initialized = true;
        if let Some(session) = self.session.as_mut() {
            if session.scope.user_id == scope.user_id {
                session.scope = scope;
                return SessionChange::Refreshed;
            }
        }
        self.generation += 1;
        self.session = Some(SessionState::new(scope, self.generation));
        SessionChange::Started
    }

    /// Full teardown: discards the session and everything derived from it.
    pub fn sign_out(&mut self) {
        self.initialized = true;
        self.session = None;
    }

    /// Issues a ticket for a new request of `kind`; `None` without a session.
    pub fn issue(&mut self, kind: RequestKind) -> Option<Ticket> {
        let session = self.session.as_mut()?;
        let slot = &mut session.issued[kind.index()];
        *slot += 1;
        Some(Ticket {
            scope: session.scope.clone(),
            generation: session.generation,
            kind,
            seq: *slot,
        })
    }

    pub fn session_key(&self) -> Option<SessionKey> {
        self.session.as_ref().map(|session| SessionKey {
            scope: session.scope.clone(),
            generation: session.generation,
        })
    }

    /// `true` while the session `key` was taken from is still the current one.
    pub fn is_session_current(&self, key: &SessionKey) -> bool {
        self.owns(&key.scope.user_id, key.generation)
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        match &self.session {
            Some(session) => {
                self.owns(ticket.user_id(), ticket.generation)
                    && ticket.seq > session.applied[ticket.kind.index()]
            }
            None => false,
        }
    }

    fn owns(&self, user_id: &UserId, generation: u64) -> bool {
        self.session.as_ref().is_some_and(|session| {
            session.generation == generation && session.scope.user_id == *user_id
        })
    }

    /// Returns `false` when the result is stale and was discarded.
    pub fn apply_permission(&mut self, ticket: &Ticket, permission: PermissionState) -> bool {
        if ticket.kind != RequestKind::Permission || !self.is_current(ticket) {
            return false;
        }
        if let Some(session) = self.session.as_mut() {
            session.applied[ticket.kind.index()] = ticket.seq;
            session.permission = Some(permission);
        }
        true
    }

    /// Applies the answer to a permission prompt. Only a session change makes
    /// it stale; reads issued before it are discarded when they resolve.
    pub fn apply_prompted_permission(
        &mut self,
        ticket: &Ticket,
        permission: PermissionState,
    ) -> bool {
        if ticket.kind != RequestKind::Permission
            || !self.owns(ticket.user_id(), ticket.generation)
        {
            return false;
        }
        if let Some(session) = self.session.as_mut() {
            let index = ticket.kind.index();
            session.applied[index] = session.issued[index];
            session.permission = Some(permission);
        }
        true
    }

    /// Returns `false` when the result is stale and was discarded.
    pub fn apply_contacts(&mut self, ticket: &Ticket, contacts: Vec<EmergencyContact>) -> bool {
        if ticket.kind != RequestKind::Contacts || !self.is_current(ticket) {
            return false;
        }
        if let Some(session) = self.session.as_mut() {
            session.applied[ticket.kind.index()] = ticket.seq;
            session.contacts = Some(contacts);
        }
        true
    }

    /// Valid only once both the permission and the contact list resolved.
    pub fn readiness(&self) -> Option<ReadinessState> {
        let session = self.session.as_ref()?;
        let permission = session.permission?;
        let contacts = session.contacts.as_deref()?;
        Some(self.policy.evaluate(permission, contacts))
    }

    pub fn activation(&self) -> Option<ActivationState> {
        self.session.as_ref().map(|session| session.activation)
    }

    pub fn contacts(&self) -> &[EmergencyContact] {
        self.session
            .as_ref()
            .and_then(|session| session.contacts.as_deref())
            .unwrap_or(&[])
    }

    /// User-confirmed activation. Has no effect unless readiness is satisfied.
    pub fn confirm_activate(&mut self) -> Option<ActivationState> {
        let satisfied = self.readiness().is_some_and(|readiness| readiness.satisfied);
        let session = self.session.as_mut()?;
        if satisfied {
            session.activation = ActivationState::Active;
        }
        Some(session.activation)
    }

    pub fn progress(&self) -> Option<OnboardingProgress> {
        let session = self.session.as_ref()?;
        let permission = session.permission.unwrap_or_default();
        let contact_count = session.contacts.as_ref().map_or(0, Vec::len);
        let required_contacts = self.policy.min_contacts();
        let readiness = self.readiness();
        Some(OnboardingProgress {
            permission,
            contact_count,
            required_contacts,
            location_step_done: permission == PermissionState::Granted,
            contacts_step_done: contact_count >= required_contacts,
            synced: readiness.is_some(),
            can_activate: readiness.is_some_and(|readiness| readiness.satisfied),
        })
    }

    pub fn presentation(&self) -> Presentation {
        if !self.initialized {
            return Presentation::Initializing;
        }
        match &self.session {
            None => Presentation::SignedOut {
                redirect_to: self.auth_redirect.clone(),
            },
            Some(session) if session.activation == ActivationState::Active => {
                Presentation::Active {
                    user_id: session.scope.user_id.clone(),
                }
            }
            Some(_) => match self.progress() {
                Some(progress) => Presentation::Onboarding(progress),
                None => Presentation::Initializing,
            },
        }
    }
}
