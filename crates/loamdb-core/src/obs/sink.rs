//! Metrics sink boundary.
//!
//! Core DB logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only allowed bridge between execution logic
//! and the global metrics state.

use crate::obs::metrics;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Arc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// ExecKind
///

#[derive(Clone, Copy, Debug)]
pub enum ExecKind {
    Insert,
    Update,
    Delete,
    Find,
}

///
/// PlanKind
///

#[derive(Clone, Copy, Debug)]
pub enum PlanKind {
    Index,
    FullScan,
}

///
/// BuildPhase
///

#[derive(Clone, Copy, Debug)]
pub enum BuildPhase {
    Started,
    Ready,
    Aborted,
}

///
/// MetricsEvent
///

#[derive(Clone, Debug)]
pub enum MetricsEvent {
    Exec {
        kind: ExecKind,
    },
    Plan {
        kind: PlanKind,
    },
    RowsScanned {
        rows: u64,
    },
    IndexAccess {
        index: String,
    },
    IndexDelta {
        inserts: u64,
        removes: u64,
    },
    UniqueViolation {
        index: String,
    },
    Build {
        phase: BuildPhase,
        index: String,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &MetricsEvent);
}

/// GlobalMetricsSink
/// Default process-wide sink that writes into global metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: &MetricsEvent) {
        match event {
            MetricsEvent::Exec { kind } => {
                metrics::with_state_mut(|m| match kind {
                    ExecKind::Insert => m.ops.insert_calls = m.ops.insert_calls.saturating_add(1),
                    ExecKind::Update => m.ops.update_calls = m.ops.update_calls.saturating_add(1),
                    ExecKind::Delete => m.ops.delete_calls = m.ops.delete_calls.saturating_add(1),
                    ExecKind::Find => m.ops.find_calls = m.ops.find_calls.saturating_add(1),
                });
            }

            MetricsEvent::Plan { kind } => {
                metrics::with_state_mut(|m| match kind {
                    PlanKind::Index => m.ops.plan_index = m.ops.plan_index.saturating_add(1),
                    PlanKind::FullScan => {
                        m.ops.plan_full_scan = m.ops.plan_full_scan.saturating_add(1);
                    }
                });
            }

            MetricsEvent::RowsScanned { rows } => {
                metrics::with_state_mut(|m| {
                    m.ops.rows_scanned = m.ops.rows_scanned.saturating_add(*rows);
                });
            }

            MetricsEvent::IndexAccess { index } => {
                metrics::with_state_mut(|m| {
                    let entry = m.indexes.entry(index.clone()).or_default();
                    entry.accesses = entry.accesses.saturating_add(1);
                });
            }

            MetricsEvent::IndexDelta { inserts, removes } => {
                metrics::with_state_mut(|m| {
                    m.ops.index_inserts = m.ops.index_inserts.saturating_add(*inserts);
                    m.ops.index_removes = m.ops.index_removes.saturating_add(*removes);
                });
            }

            MetricsEvent::UniqueViolation { index } => {
                metrics::with_state_mut(|m| {
                    m.ops.unique_violations = m.ops.unique_violations.saturating_add(1);
                    let entry = m.indexes.entry(index.clone()).or_default();
                    entry.unique_violations = entry.unique_violations.saturating_add(1);
                });
            }

            MetricsEvent::Build { phase, .. } => {
                metrics::with_state_mut(|m| match phase {
                    BuildPhase::Started => {
                        m.ops.builds_started = m.ops.builds_started.saturating_add(1);
                    }
                    BuildPhase::Ready => m.ops.builds_ready = m.ops.builds_ready.saturating_add(1),
                    BuildPhase::Aborted => {
                        m.ops.builds_aborted = m.ops.builds_aborted.saturating_add(1);
                    }
                });
            }
        }
    }
}

pub(crate) fn record(event: MetricsEvent) {
    let installed = SINK_OVERRIDE.with(|cell| cell.borrow().clone());

    match installed {
        Some(sink) => sink.record(&event),
        None => GlobalMetricsSink.record(&event),
    }
}

/// Snapshot the current metrics state for endpoint/test plumbing.
#[must_use]
pub fn metrics_report() -> metrics::EventState {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
///
/// Worker threads always see the global sink; the override scopes test and
/// endpoint plumbing to the calling thread. The previous override is
/// restored on all exits, including unwind.
pub fn with_metrics_sink<T>(sink: Arc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Arc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
    }

    impl MetricsSink for CountingSink {
        fn record(&self, _: &MetricsEvent) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn with_metrics_sink_routes_and_restores_nested_overrides() {
        let outer = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });
        let inner = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });

        with_metrics_sink(outer.clone(), || {
            record(MetricsEvent::Plan {
                kind: PlanKind::Index,
            });
            assert_eq!(outer.calls.load(Ordering::SeqCst), 1);

            with_metrics_sink(inner.clone(), || {
                record(MetricsEvent::Plan {
                    kind: PlanKind::FullScan,
                });
            });

            // Inner override was restored to outer override.
            record(MetricsEvent::Plan {
                kind: PlanKind::Index,
            });
        });

        assert_eq!(outer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn with_metrics_sink_restores_override_on_panic() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });

        let panicked = catch_unwind(AssertUnwindSafe(|| {
            with_metrics_sink(sink.clone(), || {
                record(MetricsEvent::Plan {
                    kind: PlanKind::Index,
                });
                panic!("intentional panic for guard test");
            });
        }))
        .is_err();
        assert!(panicked);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

        // Guard restored the slot; further events do not reach the sink.
        record(MetricsEvent::Plan {
            kind: PlanKind::FullScan,
        });
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn index_access_events_accumulate_per_index() {
        metrics_reset_all();

        record(MetricsEvent::IndexAccess {
            index: "obs_tests_item_1".into(),
        });
        record(MetricsEvent::IndexAccess {
            index: "obs_tests_item_1".into(),
        });

        let report = metrics_report();
        let counters = report
            .indexes
            .get("obs_tests_item_1")
            .expect("index counters should be present");
        assert_eq!(counters.accesses, 2);
    }
}
