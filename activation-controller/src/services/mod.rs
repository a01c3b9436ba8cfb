pub mod activation_gate;
pub mod contact_store;
pub mod contact_sync;
pub mod controller;
pub mod metrics;
pub mod notifier;
pub mod permission_probe;
pub mod readiness;
pub mod session_watcher;

pub use activation_gate::{ActivationGate, RequestKind, SessionChange, SessionKey, Ticket};
pub use contact_store::{
    ContactStore, InMemoryContactStore, MongoContactStore, RestContactStore, StoreError,
};
pub use contact_sync::ContactSync;
pub use controller::{
    ActivationController, Collaborators, ControllerError, ControllerHandle, ControllerOptions,
};
pub use notifier::{MockNotifier, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use permission_probe::{
    CapabilityError, LocationCapability, PermissionProbe, ScriptedLocationCapability,
};
pub use readiness::{evaluate, ReadinessPolicy, DEFAULT_MIN_CONTACTS};
pub use session_watcher::{LocalSessionSource, SessionSource, SessionSubscription, SessionWatcher};
