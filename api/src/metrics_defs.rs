//! Metrics definitions for the HTTP API.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "api.request.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of API requests in seconds. Tagged with method, status.",
};

pub const METRICS_BATCH_DURATION: MetricDef = MetricDef {
    name: "aggregator.batch.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of one performance metrics batch query in seconds",
};

pub const METRICS_BATCH_FAILED: MetricDef = MetricDef {
    name: "aggregator.batch.failed",
    metric_type: MetricType::Counter,
    description: "Performance metrics batch queries that failed",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    METRICS_BATCH_DURATION,
    METRICS_BATCH_FAILED,
];
