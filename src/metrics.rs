use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Initialize Prometheus metrics exporter
/// Returns a handle that can be used to render metrics for scraping
pub fn init_metrics() -> Result<PrometheusHandle> {
    // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
    let buckets = [
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &buckets,
        )
        .context("failed to set buckets for http_request_duration_seconds")?
        .set_buckets_for_metric(
            Matcher::Full("departure_cycle.duration_seconds".to_string()),
            &buckets,
        )
        .context("failed to set buckets for departure_cycle.duration_seconds")?
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    initialize_departure_metrics();
    Ok(handle)
}

/// Register every metric at zero so dashboards see them before the first event
pub fn initialize_departure_metrics() {
    metrics::counter!("airport_reference.cache_hits_total").absolute(0);
    metrics::counter!("airport_reference.cache_misses_total").absolute(0);
    metrics::counter!("airport_reference.fetches_total").absolute(0);
    metrics::counter!("airport_reference.fetch_failures_total").absolute(0);
    metrics::gauge!("airport_reference.cached").set(0.0);

    metrics::counter!("departure_cycle.completed_total").absolute(0);
    metrics::counter!("departure_cycle.failures_total").absolute(0);
    metrics::gauge!("departure_cycle.pilots").set(0.0);
}
