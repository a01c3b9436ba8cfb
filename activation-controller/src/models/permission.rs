use serde::{Deserialize, Serialize};

/// Location permission as tracked by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionState::Unknown => write!(f, "unknown"),
            PermissionState::Granted => write!(f, "granted"),
            PermissionState::Denied => write!(f, "denied"),
        }
    }
}

/// Raw answer of the device's non-prompting permission query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityState {
    Granted,
    Denied,
    Prompt,
}

impl From<CapabilityState> for PermissionState {
    fn from(state: CapabilityState) -> Self {
        match state {
            CapabilityState::Granted => PermissionState::Granted,
            CapabilityState::Denied => PermissionState::Denied,
            CapabilityState::Prompt => PermissionState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
}

/// Result of a prompting permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestOutcome {
    Granted,
    Denied,
    /// The running environment has no location capability at all.
    Unsupported,
}

impl RequestOutcome {
    pub fn permission(self) -> PermissionState {
        match self {
            RequestOutcome::Granted => PermissionState::Granted,
            RequestOutcome::Denied => PermissionState::Denied,
            RequestOutcome::Unsupported => PermissionState::Unknown,
        }
    }
}

impl std::fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestOutcome::Granted => write!(f, "granted"),
            RequestOutcome::Denied => write!(f, "denied"),
            RequestOutcome::Unsupported => write!(f, "unsupported"),
        }
    }
}
