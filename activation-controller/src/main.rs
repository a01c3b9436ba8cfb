use activation_controller::config::{
    get_configuration, ContactStoreSettings, DevicePermission, Settings, StoreBackend,
};
use activation_controller::models::{CapabilityState, Presentation, Session};
use activation_controller::services::metrics::{get_metrics, init_metrics};
use activation_controller::services::{
    CapabilityError, ContactStore, InMemoryContactStore, LocalSessionSource, MongoContactStore,
    RestContactStore, ScriptedLocationCapability, TracingNotifier,
};
use activation_controller::{ActivationController, Collaborators};
use chrono::{Duration, Utc};
use dotenvy::dotenv;
use safety_core::observability::init_tracing;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::info;

const SYNC_TIMEOUT_SECS: u64 = 30;

/// Reports the onboarding status of one session: signs the configured session
/// in, lets the controller sync, prints the presentation as JSON and exits.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "activation-controller",
        &configuration.observability.log_level,
        configuration.observability.otlp_endpoint.as_deref(),
    );
    init_metrics()?;

    let sessions = Arc::new(LocalSessionSource::new());
    if let Some(session) = &configuration.session {
        let mut signed_in = Session::new(
            session.user_id.as_str(),
            session.access_token.expose_secret().as_str(),
            Utc::now() + Duration::seconds(session.expires_in_secs),
        );
        signed_in.email = session.email.clone();
        sessions.sign_in(signed_in);
    }

    let collaborators = Collaborators {
        sessions: sessions.clone(),
        contacts: build_contact_store(&configuration.contact_store).await?,
        location: Arc::new(location_capability(&configuration)),
        notifier: Arc::new(TracingNotifier),
    };

    let controller =
        ActivationController::spawn(collaborators, configuration.policy.clone().into());

    let settled = tokio::time::timeout(
        std::time::Duration::from_secs(SYNC_TIMEOUT_SECS),
        controller.wait_for(|presentation| match presentation {
            Presentation::Initializing => false,
            Presentation::Onboarding(progress) => progress.synced,
            _ => true,
        }),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Timed out waiting for onboarding status"))??;

    info!(mode = ?settled, "Onboarding status resolved");
    println!("{}", serde_json::to_string_pretty(&settled)?);
    tracing::debug!(metrics = %get_metrics(), "Controller metrics");

    controller.shutdown().await;
    Ok(())
}

async fn build_contact_store(
    settings: &ContactStoreSettings,
) -> anyhow::Result<Arc<dyn ContactStore>> {
    let store: Arc<dyn ContactStore> = match settings.backend {
        StoreBackend::Rest => Arc::new(RestContactStore::new(
            settings.url.clone(),
            settings.table.clone(),
            settings.api_key.clone(),
            std::time::Duration::from_secs(settings.request_timeout_secs),
        )?),
        StoreBackend::Mongo => {
            let store =
                MongoContactStore::connect(&settings.url, &settings.database, &settings.table)
                    .await?;
            store.initialize_indexes().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => Arc::new(InMemoryContactStore::new()),
    };
    Ok(store)
}

fn location_capability(settings: &Settings) -> ScriptedLocationCapability {
    match settings.device.location_permission {
        DevicePermission::Granted => ScriptedLocationCapability::new(Ok(CapabilityState::Granted)),
        DevicePermission::Denied => {
            let capability = ScriptedLocationCapability::new(Ok(CapabilityState::Denied));
            capability.set_request_result(Err(CapabilityError::PermissionDenied(
                "blocked by device policy".to_string(),
            )));
            capability
        }
        DevicePermission::Prompt => ScriptedLocationCapability::prompting(),
        DevicePermission::Unsupported => ScriptedLocationCapability::unsupported(),
    }
}
