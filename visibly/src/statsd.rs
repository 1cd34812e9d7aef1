use crate::config::MetricsConfig;
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::{MetricDef, describe_metrics};

const PREFIX: &str = "visibly";

#[derive(thiserror::Error, Debug)]
pub enum StatsdError {
    #[error("could not build statsd exporter: {0}")]
    Build(#[from] metrics_exporter_statsd::StatsdError),
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

/// Every metric the service emits, grouped by crate.
pub const METRIC_GROUPS: &[&[MetricDef]] = &[
    amazon_ads::metrics_defs::ALL_METRICS,
    docdb_cache::metrics_defs::ALL_METRICS,
    api::metrics_defs::ALL_METRICS,
];

/// Routes the `metrics` facade to StatsD and registers metric descriptions.
pub fn init(config: &MetricsConfig) -> Result<(), StatsdError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(PREFIX))?;
    metrics::set_global_recorder(recorder).map_err(|_| StatsdError::AlreadyInstalled)?;

    for name in describe_metrics(METRIC_GROUPS) {
        tracing::warn!(metric = name, "metric defined more than once");
    }

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "sending metrics to statsd"
    );
    Ok(())
}
