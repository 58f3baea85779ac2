//! Observability: runtime counters and the sink boundary services report to.
//!
//! Services never touch metrics state directly. Every counter flows through
//! a [`MetricsEvent`] handed to a [`MetricsSink`].

mod metrics;
mod sink;

pub use metrics::{EventCounters, EventReport, MetricsRegistry};
pub use sink::{
    GlobalMetricsSink, MetricsEvent, MetricsSink, RejectReason, SharedSink, global_sink,
    metrics_report, metrics_reset_all,
};
