//! Metrics sink boundary.
//!
//! Services hold a [`SharedSink`] and report through [`MetricsEvent`]s.
//! Sinks are injected rather than installed per thread, since a request may
//! hop worker threads between awaits.

use crate::obs::metrics::{EventReport, MetricsRegistry};
use crate::types::Timestamp;
use std::sync::{Arc, LazyLock};

static GLOBAL_METRICS: LazyLock<MetricsRegistry> = LazyLock::new(MetricsRegistry::new);

///
/// RejectReason
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RejectReason {
    CourseNotFound,
    CourseNotActive,
    AlreadyEnrolled,
    CapacityExceeded,
    Forbidden,
}

impl RejectReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CourseNotFound => "course_not_found",
            Self::CourseNotActive => "course_not_active",
            Self::AlreadyEnrolled => "already_enrolled",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::Forbidden => "forbidden",
        }
    }
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    EnrollCommitted { attempts: u32 },
    EnrollRejected { reason: RejectReason },
    RemoveCommitted { attempts: u32 },
    ContentionExhausted { attempts: u32 },
    CountClamped,
    CountRepaired,
    ProfileCreated,
    ProfileRace,
    AccessRedirected,
    SessionFailed,
    MessagePosted,
    MessageDelivered,
    DuplicateDropped,
    SubscriberLagged { skipped: u64 },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent);
}

pub type SharedSink = Arc<dyn MetricsSink>;

///
/// GlobalMetricsSink
///
/// Default sink writing into the process-wide registry.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        GLOBAL_METRICS.apply(&event);
    }
}

impl MetricsSink for MetricsRegistry {
    fn record(&self, event: MetricsEvent) {
        self.apply(&event);
    }
}

/// Shared handle to [`GlobalMetricsSink`].
#[must_use]
pub fn global_sink() -> SharedSink {
    Arc::new(GlobalMetricsSink)
}

/// Snapshot the process-wide counters.
#[must_use]
pub fn metrics_report(window_start: Option<Timestamp>) -> EventReport {
    GLOBAL_METRICS.report(window_start)
}

/// Reset the process-wide counters.
pub fn metrics_reset_all() {
    GLOBAL_METRICS.reset();
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
    }

    impl MetricsSink for CountingSink {
        fn record(&self, _: MetricsEvent) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn injected_sink_receives_events() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });
        let shared: SharedSink = sink.clone();

        shared.record(MetricsEvent::RemoveCommitted { attempts: 1 });
        shared.record(MetricsEvent::CountClamped);

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn registry_can_stand_in_as_sink() {
        let registry = Arc::new(MetricsRegistry::new());
        let shared: SharedSink = registry.clone();

        shared.record(MetricsEvent::DuplicateDropped);

        let counters = registry.report(None).counters.expect("counters");
        assert_eq!(counters.duplicates_dropped, 1);
    }
}
