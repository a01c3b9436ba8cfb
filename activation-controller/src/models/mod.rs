pub mod contact;
pub mod permission;
pub mod readiness;
pub mod session;

pub use contact::{EmergencyContact, NewEmergencyContact};
pub use permission::{CapabilityState, PermissionState, Position, RequestOutcome};
pub use readiness::{ActivationState, OnboardingProgress, Presentation, ReadinessState};
pub use session::{AccessScope, AuthChangeEvent, AuthNotification, Session, SessionEvent, UserId};
