use crate::{obs::sink::MetricsEvent, types::Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// EventCounters
/// Ephemeral, in-memory counters for scheduling operations.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventCounters {
    // Enrollment
    pub enroll_committed: u64,
    pub enroll_rejected: BTreeMap<String, u64>,
    pub remove_committed: u64,
    pub commit_retries: u64,
    pub contention_exhausted: u64,
    pub count_clamped: u64,
    pub count_repaired: u64,

    // Identity
    pub profiles_created: u64,
    pub profile_races: u64,
    pub access_redirected: u64,
    pub session_failures: u64,

    // Feed
    pub messages_posted: u64,
    pub messages_delivered: u64,
    pub duplicates_dropped: u64,
    pub subscriber_lagged: u64,
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventReport {
    pub window_start: Timestamp,
    pub counters: Option<EventCounters>,
}

#[derive(Debug)]
struct EventState {
    counters: EventCounters,
    window_start: Timestamp,
}

impl EventState {
    fn fresh() -> Self {
        Self {
            counters: EventCounters::default(),
            window_start: Timestamp::now(),
        }
    }
}

///
/// MetricsRegistry
///
/// Counter state behind a lock. The process-wide instance backs
/// [`GlobalMetricsSink`](crate::obs::GlobalMetricsSink); tests build their
/// own to stay isolated.
///

#[derive(Debug)]
pub struct MetricsRegistry {
    state: Mutex<EventState>,
}

impl MetricsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EventState::fresh()),
        }
    }

    pub fn apply(&self, event: &MetricsEvent) {
        let mut state = self.state.lock();
        let c = &mut state.counters;

        match event {
            MetricsEvent::EnrollCommitted { attempts } => {
                c.enroll_committed = c.enroll_committed.saturating_add(1);
                c.commit_retries = c
                    .commit_retries
                    .saturating_add(u64::from(attempts.saturating_sub(1)));
            }
            MetricsEvent::EnrollRejected { reason } => {
                let entry = c
                    .enroll_rejected
                    .entry(reason.as_str().to_string())
                    .or_default();
                *entry = entry.saturating_add(1);
            }
            MetricsEvent::RemoveCommitted { attempts } => {
                c.remove_committed = c.remove_committed.saturating_add(1);
                c.commit_retries = c
                    .commit_retries
                    .saturating_add(u64::from(attempts.saturating_sub(1)));
            }
            MetricsEvent::ContentionExhausted { attempts } => {
                c.contention_exhausted = c.contention_exhausted.saturating_add(1);
                c.commit_retries = c
                    .commit_retries
                    .saturating_add(u64::from(attempts.saturating_sub(1)));
            }
            MetricsEvent::CountClamped => c.count_clamped = c.count_clamped.saturating_add(1),
            MetricsEvent::CountRepaired => c.count_repaired = c.count_repaired.saturating_add(1),
            MetricsEvent::ProfileCreated => {
                c.profiles_created = c.profiles_created.saturating_add(1);
            }
            MetricsEvent::ProfileRace => c.profile_races = c.profile_races.saturating_add(1),
            MetricsEvent::AccessRedirected => {
                c.access_redirected = c.access_redirected.saturating_add(1);
            }
            MetricsEvent::SessionFailed => {
                c.session_failures = c.session_failures.saturating_add(1);
            }
            MetricsEvent::MessagePosted => {
                c.messages_posted = c.messages_posted.saturating_add(1);
            }
            MetricsEvent::MessageDelivered => {
                c.messages_delivered = c.messages_delivered.saturating_add(1);
            }
            MetricsEvent::DuplicateDropped => {
                c.duplicates_dropped = c.duplicates_dropped.saturating_add(1);
            }
            MetricsEvent::SubscriberLagged { skipped } => {
                c.subscriber_lagged = c.subscriber_lagged.saturating_add(*skipped);
            }
        }
    }

    /// Snapshot counters. `window_start` filters by the start of the
    /// current window, not by per-event timestamps.
    #[must_use]
    pub fn report(&self, window_start: Option<Timestamp>) -> EventReport {
        let state = self.state.lock();
        let included = window_start.is_none_or(|since| since <= state.window_start);

        EventReport {
            window_start: state.window_start,
            counters: included.then(|| state.counters.clone()),
        }
    }

    pub fn reset(&self) {
        *self.state.lock() = EventState::fresh();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::RejectReason;

    #[test]
    fn retries_accumulate_from_attempts() {
        let registry = MetricsRegistry::new();
        registry.apply(&MetricsEvent::EnrollCommitted { attempts: 1 });
        registry.apply(&MetricsEvent::EnrollCommitted { attempts: 3 });
        registry.apply(&MetricsEvent::ContentionExhausted { attempts: 3 });

        let counters = registry
            .report(None)
            .counters
            .expect("report without window should include counters");
        assert_eq!(counters.enroll_committed, 2);
        assert_eq!(counters.contention_exhausted, 1);
        assert_eq!(counters.commit_retries, 4);
    }

    #[test]
    fn rejections_are_keyed_by_reason() {
        let registry = MetricsRegistry::new();
        registry.apply(&MetricsEvent::EnrollRejected {
            reason: RejectReason::CapacityExceeded,
        });
        registry.apply(&MetricsEvent::EnrollRejected {
            reason: RejectReason::CapacityExceeded,
        });
        registry.apply(&MetricsEvent::EnrollRejected {
            reason: RejectReason::AlreadyEnrolled,
        });

        let counters = registry.report(None).counters.expect("counters");
        assert_eq!(counters.enroll_rejected.get("capacity_exceeded"), Some(&2));
        assert_eq!(counters.enroll_rejected.get("already_enrolled"), Some(&1));
    }

    #[test]
    fn window_start_after_window_returns_empty() {
        let registry = MetricsRegistry::new();
        registry.apply(&MetricsEvent::MessagePosted);
        let start = registry.report(None).window_start;

        let later = Timestamp::from_seconds(start.get().saturating_add(1));
        assert!(registry.report(Some(later)).counters.is_none());
        assert!(registry.report(Some(start)).counters.is_some());
    }

    #[test]
    fn reset_clears_counters() {
        let registry = MetricsRegistry::new();
        registry.apply(&MetricsEvent::ProfileCreated);
        registry.reset();

        let counters = registry.report(None).counters.expect("counters");
        assert_eq!(counters, EventCounters::default());
    }
}
