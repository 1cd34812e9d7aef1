//! Common types for metrics definitions.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Gauge => "Gauge",
            MetricType::Histogram => "Histogram",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

/// Registers descriptions for every definition with the installed recorder.
/// Returns the names that were defined more than once.
pub fn describe_metrics(groups: &[&[MetricDef]]) -> Vec<&'static str> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();

    for def in groups.iter().flat_map(|g| g.iter()) {
        if !seen.insert(def.name) {
            duplicates.push(def.name);
            continue;
        }
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Gauge => metrics::describe_gauge!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }

    duplicates
}

#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
    ($def:expr, $($label:expr => $value:expr),+ $(,)?) => {
        metrics::counter!($def.name, $($label => $value),+)
    };
}

#[macro_export]
macro_rules! gauge {
    ($def:expr) => {
        metrics::gauge!($def.name)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
    ($def:expr, $($label:expr => $value:expr),+ $(,)?) => {
        metrics::histogram!($def.name, $($label => $value),+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: MetricDef = MetricDef {
        name: "a",
        metric_type: MetricType::Counter,
        description: "a",
    };
    const B: MetricDef = MetricDef {
        name: "b",
        metric_type: MetricType::Histogram,
        description: "b",
    };

    #[test]
    fn test_describe_reports_duplicates() {
        assert!(describe_metrics(&[&[A, B]]).is_empty());
        assert_eq!(describe_metrics(&[&[A], &[B, A]]), vec!["a"]);
    }
}
