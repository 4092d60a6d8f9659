//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! This module does not access storage internals directly.
//! Engine-level inspection lives in `db`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventState, IndexCounters};
pub use sink::{
    BuildPhase, ExecKind, MetricsEvent, MetricsSink, PlanKind, metrics_report, metrics_reset_all,
    with_metrics_sink,
};
