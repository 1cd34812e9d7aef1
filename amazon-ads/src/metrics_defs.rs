//! Metrics definitions for the Amazon Advertising client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const VENDOR_REQUEST_DURATION: MetricDef = MetricDef {
    name: "vendor.request.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of Amazon Advertising API calls in seconds. Tagged with method, status.",
};

pub const VENDOR_RETRY: MetricDef = MetricDef {
    name: "vendor.retry",
    metric_type: MetricType::Counter,
    description: "Number of Amazon Advertising API calls retried after a retriable status",
};

pub const TOKEN_REFRESH: MetricDef = MetricDef {
    name: "vendor.token.refresh",
    metric_type: MetricType::Counter,
    description: "Number of Login with Amazon access token refreshes",
};

pub const ALL_METRICS: &[MetricDef] = &[VENDOR_REQUEST_DURATION, VENDOR_RETRY, TOKEN_REFRESH];
