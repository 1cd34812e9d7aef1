//! Metrics definitions for the document cache.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "cache.hit",
    metric_type: MetricType::Counter,
    description: "Reads served from the document store. Tagged with resource, op.",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "cache.miss",
    metric_type: MetricType::Counter,
    description: "Reads that missed the document store and went to the vendor. Tagged with resource, op.",
};

pub const CACHE_BYPASS: MetricDef = MetricDef {
    name: "cache.bypass",
    metric_type: MetricType::Counter,
    description: "Reads sent straight to the vendor because of a live directive. Tagged with resource.",
};

pub const CACHE_READ_ERROR: MetricDef = MetricDef {
    name: "cache.read_error",
    metric_type: MetricType::Counter,
    description: "Document store reads that failed and fell back to the vendor",
};

pub const CACHE_WRITE_ERROR: MetricDef = MetricDef {
    name: "cache.write_error",
    metric_type: MetricType::Counter,
    description: "Document store write-backs that failed",
};

pub const CACHE_WRITE_BACK: MetricDef = MetricDef {
    name: "cache.write_back",
    metric_type: MetricType::Counter,
    description: "Documents written back to the store. Tagged with resource, op.",
};

pub const NEGATIVE_CACHE_HIT: MetricDef = MetricDef {
    name: "cache.negative.hit",
    metric_type: MetricType::Counter,
    description: "Entity lookups answered by the negative cache",
};

pub const NEGATIVE_CACHE_MISS: MetricDef = MetricDef {
    name: "cache.negative.miss",
    metric_type: MetricType::Counter,
    description: "Entity lookups not found in the negative cache",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CACHE_HIT,
    CACHE_MISS,
    CACHE_BYPASS,
    CACHE_READ_ERROR,
    CACHE_WRITE_ERROR,
    CACHE_WRITE_BACK,
    NEGATIVE_CACHE_HIT,
    NEGATIVE_CACHE_MISS,
];
