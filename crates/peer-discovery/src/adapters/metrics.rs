//! Metrics forwarding via `tracing`. No dedicated exporter is in scope;
//! the host application's own tracing subscriber decides where these
//! events end up (stdout, an OpenTelemetry pipeline, etc).

use crate::ports::MetricsSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn incr(&self, name: &'static str, value: u64) {
        tracing::info!(counter = name, value, "metric.incr");
    }

    fn gauge(&self, name: &'static str, value: i64) {
        tracing::info!(gauge = name, value, "metric.gauge");
    }
}
