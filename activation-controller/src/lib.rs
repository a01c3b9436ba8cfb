//! Activation readiness controller.
//!
//! Decides when an account may leave mandatory onboarding (location access
//! plus enough emergency contacts) and enter active safety monitoring, kept
//! in sync with the auth session and the remote contact store.
pub mod config;
pub mod models;
pub mod services;

pub use services::controller::{
    ActivationController, Collaborators, ControllerError, ControllerHandle, ControllerOptions,
};
