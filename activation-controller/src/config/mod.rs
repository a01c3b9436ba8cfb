use crate::services::readiness::{ReadinessPolicy, DEFAULT_MIN_CONTACTS};
use secrecy::Secret;
use serde::Deserialize;
use safety_core::error::AppError;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    #[serde(default)]
    pub policy: PolicySettings,
    pub contact_store: ContactStoreSettings,
    #[serde(default)]
    pub observability: ObservabilitySettings,
    /// Session handed over by the host when running the status binary.
    #[serde(default)]
    pub session: Option<SessionSettings>,
    #[serde(default)]
    pub device: DeviceSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PolicySettings {
    /// Emergency contacts required before activation is offered.
    #[serde(default = "default_min_contacts")]
    pub min_contacts: usize,
    /// Where unauthenticated users are sent.
    #[serde(default = "default_auth_redirect")]
    pub auth_redirect: String,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            min_contacts: default_min_contacts(),
            auth_redirect: default_auth_redirect(),
        }
    }
}

impl PolicySettings {
    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::new(self.min_contacts)
    }
}

fn default_min_contacts() -> usize {
    DEFAULT_MIN_CONTACTS
}

fn default_auth_redirect() -> String {
    "/auth".to_string()
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Rest,
    Mongo,
    Memory,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ContactStoreSettings {
    pub backend: StoreBackend,
    /// REST base URL or MongoDB connection string, depending on `backend`.
    #[serde(default)]
    pub url: String,
    /// Anonymous API key sent as `apikey` to the REST backend.
    pub api_key: Option<Secret<String>>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_table() -> String {
    "emergency_contacts".to_string()
}

fn default_database() -> String {
    "safety_db".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Deserialize, Clone, Debug)]
pub struct ObservabilitySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Clone, Debug)]
pub struct SessionSettings {
    pub user_id: String,
    pub access_token: Secret<String>,
    #[serde(default = "default_session_ttl_secs")]
    pub expires_in_secs: i64,
    pub email: Option<String>,
}

fn default_session_ttl_secs() -> i64 {
    3600
}

/// Location permission reported by a headless device.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DevicePermission {
    Granted,
    Denied,
    #[default]
    Prompt,
    Unsupported,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct DeviceSettings {
    #[serde(default)]
    pub location_permission: DevicePermission,
}

pub fn get_configuration() -> Result<Settings, AppError> {
    let base_path = std::env::current_dir()?;

    // Run either from the crate directory or from the workspace root.
    let configuration_directory = if base_path.ends_with("activation-controller") {
        base_path.join("config")
    } else {
        base_path.join("activation-controller").join("config")
    };

    let base_file = configuration_directory.join("base");
    let base_file = base_file.to_str().ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!(
            "Configuration path is not valid UTF-8: {}",
            configuration_directory.display()
        ))
    })?;

    safety_core::config::load_from(base_file)
}
