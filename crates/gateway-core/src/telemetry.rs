use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// Initialise tracing and, when enabled, the Prometheus recorder.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to the
/// whole process. Returns the render handle for the `/metrics` route, or
/// `None` when metrics are disabled (the route then serves 404).
pub fn init(log_level: &str, metrics_enabled: bool) -> Result<Option<PrometheusHandle>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !metrics_enabled {
        return Ok(None);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;
    Ok(Some(handle))
}
