// Prometheus exporter
// Installs the global recorder behind the `metrics` facade used by the lock core

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const ACQUIRE_DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Install the Prometheus recorder and register metric descriptions.
/// Should be called once at application startup.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("lock_acquire_duration_seconds".to_string()),
            ACQUIRE_DURATION_BUCKETS,
        )
        .context("invalid histogram buckets")?
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    latchkey_core::metrics::describe_metrics();
    Ok(handle)
}
