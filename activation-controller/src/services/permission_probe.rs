//! Location permission probe over the device capability API.

use crate::models::{CapabilityState, PermissionState, Position, RequestOutcome};
use crate::services::notifier::{Notice, Notifier};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;

pub const GRANTED_NOTICE: &str = "Location access granted!";
pub const DENIED_NOTICE: &str =
    "Location access denied. Please enable location in your browser settings.";
pub const UNSUPPORTED_NOTICE: &str = "Geolocation is not supported by your browser";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Location capability not supported: {0}")]
    Unsupported(String),

    #[error("Permission query unavailable: {0}")]
    QueryUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("Timed out waiting for a position")]
    Timeout,
}

/// Device capability API for location access.
#[async_trait]
pub trait LocationCapability: Send + Sync {
    /// Reads the current permission without prompting the user.
    async fn query_state(&self) -> Result<CapabilityState, CapabilityError>;

    /// Asks for a position fix; may prompt and wait for the user indefinitely.
    async fn request_position(&self) -> Result<Position, CapabilityError>;
}

#[derive(Clone)]
pub struct PermissionProbe {
    capability: Arc<dyn LocationCapability>,
    notifier: Arc<dyn Notifier>,
}

impl PermissionProbe {
    pub fn new(capability: Arc<dyn LocationCapability>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            capability,
            notifier,
        }
    }

    /// Non-mutating check. Never prompts and never fails: an unusable query
    /// mechanism reads as `Unknown`.
    pub async fn query(&self) -> PermissionState {
        match self.capability.query_state().await {
            Ok(state) => state.into(),
            Err(e) => {
                tracing::warn!(error = %e, "Location permission query failed, treating as unknown");
                PermissionState::Unknown
            }
        }
    }

    /// Prompting request. Surfaces a notice for every outcome.
    pub async fn request(&self) -> RequestOutcome {
        let outcome = match self.capability.request_position().await {
            Ok(position) => {
                tracing::debug!(
                    latitude = position.latitude,
                    longitude = position.longitude,
                    "Location fix acquired"
                );
                self.notifier.notify(Notice::success(GRANTED_NOTICE));
                RequestOutcome::Granted
            }
            Err(CapabilityError::Unsupported(reason)) => {
                tracing::warn!(reason = %reason, "Location capability unsupported");
                self.notifier.notify(Notice::error(UNSUPPORTED_NOTICE));
                RequestOutcome::Unsupported
            }
            Err(e) => {
                tracing::error!(error = %e, "Location request failed");
                self.notifier.notify(Notice::error(DENIED_NOTICE));
                RequestOutcome::Denied
            }
        };

        metrics::counter!("permission_request_total", "outcome" => outcome.to_string())
            .increment(1);

        outcome
    }
}

/// Scripted capability for tests and headless devices.
///
/// Requests can be held open to model a user who has not answered the prompt.
pub struct ScriptedLocationCapability {
    query_result: Mutex<Result<CapabilityState, CapabilityError>>,
    request_result: Mutex<Result<Position, CapabilityError>>,
    gate: watch::Sender<bool>,
    query_count: AtomicU64,
    request_count: AtomicU64,
}

impl ScriptedLocationCapability {
    pub fn new(query_result: Result<CapabilityState, CapabilityError>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            query_result: Mutex::new(query_result),
            request_result: Mutex::new(Ok(Position {
                latitude: 28.6139,
                longitude: 77.209,
                accuracy_m: Some(25.0),
            })),
            gate,
            query_count: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
        }
    }

    /// A device that has not been asked yet and will grant on request.
    pub fn prompting() -> Self {
        Self::new(Ok(CapabilityState::Prompt))
    }

    pub fn unsupported() -> Self {
        let unsupported = CapabilityError::Unsupported("no geolocation API".to_string());
        let capability = Self::new(Err(unsupported.clone()));
        capability.set_request_result(Err(unsupported));
        capability
    }

    pub fn set_query_result(&self, result: Result<CapabilityState, CapabilityError>) {
        if let Ok(mut slot) = self.query_result.lock() {
            *slot = result;
        }
    }

    pub fn set_request_result(&self, result: Result<Position, CapabilityError>) {
        if let Ok(mut slot) = self.request_result.lock() {
            *slot = result;
        }
    }

    /// Subsequent requests wait until [`Self::answer_requests`] is called.
    pub fn hold_requests(&self) {
        self.gate.send_replace(false);
    }

    pub fn answer_requests(&self) {
        self.gate.send_replace(true);
    }

    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::SeqCst)
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationCapability for ScriptedLocationCapability {
    async fn query_state(&self) -> Result<CapabilityState, CapabilityError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        self.query_result
            .lock()
            .map_err(|_| CapabilityError::QueryUnavailable("scripted state poisoned".to_string()))?
            .clone()
    }

    async fn request_position(&self) -> Result<Position, CapabilityError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(CapabilityError::Timeout);
        }

        self.request_result
            .lock()
            .map_err(|_| {
                CapabilityError::PositionUnavailable("scripted state poisoned".to_string())
            })?
            .clone()
    }
}
