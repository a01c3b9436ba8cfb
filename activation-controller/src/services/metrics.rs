//! Metrics recorder for the controller.
//!
//! Counters are emitted from the components themselves:
//! `activation_confirmed_total`, `activation_rejected_total`,
//! `stale_response_discarded_total{kind}`, `contact_fetch_total{status}`,
//! `permission_request_total{outcome}`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use safety_core::error::AppError;
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder. Calling it twice is an error.
pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
    })?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| AppError::InternalError(anyhow::anyhow!("metrics already initialized")))
}

/// Renders all recorded metrics in the Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
