//! Readiness evaluation: combines the permission state and the contact list
//! into the single "requirements satisfied" signal.

use crate::models::{EmergencyContact, PermissionState, ReadinessState};

/// Contacts required before monitoring can be activated.
pub const DEFAULT_MIN_CONTACTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    min_contacts: usize,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONTACTS)
    }
}

impl ReadinessPolicy {
    pub fn new(min_contacts: usize) -> Self {
        Self { min_contacts }
    }

    pub fn min_contacts(&self) -> usize {
        self.min_contacts
    }

    pub fn evaluate(
        &self,
        permission: PermissionState,
        contacts: &[EmergencyContact],
    ) -> ReadinessState {
        let permission_granted = permission == PermissionState::Granted;
        let contact_count = contacts.len();
        ReadinessState {
            permission_granted,
            contact_count,
            satisfied: permission_granted && contact_count >= self.min_contacts,
        }
    }
}

/// Evaluates readiness under the default policy.
pub fn evaluate(permission: PermissionState, contacts: &[EmergencyContact]) -> ReadinessState {
    ReadinessPolicy::default().evaluate(permission, contacts)
}
