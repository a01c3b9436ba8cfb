use super::permission::PermissionState;
use super::session::UserId;
use serde::{Deserialize, Serialize};

/// Derived onboarding requirements; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessState {
    pub permission_granted: bool,
    pub contact_count: usize,
    pub satisfied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    #[default]
    Onboarding,
    Active,
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationState::Onboarding => write!(f, "onboarding"),
            ActivationState::Active => write!(f, "active"),
        }
    }
}

/// Per-requirement progress rendered on the onboarding screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProgress {
    pub permission: PermissionState,
    pub contact_count: usize,
    pub required_contacts: usize,
    pub location_step_done: bool,
    pub contacts_step_done: bool,
    /// Both the permission and the contact list resolved for this session.
    pub synced: bool,
    pub can_activate: bool,
}

/// What the presentation layer should show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Presentation {
    /// The initial session lookup has not answered yet.
    Initializing,
    SignedOut { redirect_to: String },
    Onboarding(OnboardingProgress),
    Active { user_id: UserId },
}

impl Presentation {
    pub fn is_active(&self) -> bool {
        matches!(self, Presentation::Active { .. })
    }

    pub fn progress(&self) -> Option<&OnboardingProgress> {
        match self {
            Presentation::Onboarding(progress) => Some(progress),
            _ => None,
        }
    }
}
