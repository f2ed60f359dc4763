//! Observability: runtime counters and the sink boundary.
//!
//! Engine logic never touches the counter state directly; all
//! instrumentation flows through `MetricsEvent` and `MetricsSink`.

pub(crate) mod metrics;
pub(crate) mod sink;

pub use metrics::{EntityCounters, MetricsReport, OpCounters};
pub use sink::{
    ExecKind, MetricsEvent, MetricsSink, PlanKind, metrics_report, metrics_reset_all,
    with_metrics_sink,
};
