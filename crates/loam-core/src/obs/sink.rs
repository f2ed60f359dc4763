//! Metrics sink boundary.
//!
//! This module is the only bridge between engine logic and the counter
//! state. A thread-scoped override routes events to a caller-provided sink
//! for the duration of one closure; otherwise events land in the global
//! state.

use crate::obs::metrics::{self, MetricsReport};
use std::cell::RefCell;

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<&'static dyn MetricsSink>> = const { RefCell::new(None) };
}

///
/// ExecKind
///

#[derive(Clone, Copy, Debug)]
pub enum ExecKind {
    Persist,
    Flush,
    Find,
}

///
/// PlanKind
///

#[derive(Clone, Copy, Debug)]
pub enum PlanKind {
    Containment,
    FullScan,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent {
    ExecStart {
        kind: ExecKind,
        entity: &'static str,
    },
    ExecFinish {
        kind: ExecKind,
        entity: &'static str,
        rows_touched: u64,
    },
    RowsScanned {
        entity: &'static str,
        rows: u64,
    },
    UniqueViolation {
        entity: &'static str,
    },
    CascadeExpanded {
        entity: &'static str,
        children: u64,
    },
    Plan {
        kind: PlanKind,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

///
/// GlobalMetricsSink
/// Default process-local sink that writes into global counter state.
/// Acts as the concrete sink when no scoped override is installed.
///

struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        metrics::with_state_mut(|state| match event {
            MetricsEvent::ExecStart { kind, .. } => match kind {
                ExecKind::Persist => {
                    state.ops.persist_calls = state.ops.persist_calls.saturating_add(1);
                }
                ExecKind::Flush => {
                    state.ops.flush_calls = state.ops.flush_calls.saturating_add(1);
                }
                ExecKind::Find => {
                    state.ops.find_calls = state.ops.find_calls.saturating_add(1);
                }
            },
            MetricsEvent::ExecFinish {
                kind: ExecKind::Flush,
                entity,
                rows_touched,
            } => {
                let entry = state.entities.entry(entity.to_string()).or_default();
                entry.rows_written = entry.rows_written.saturating_add(rows_touched);
            }
            MetricsEvent::ExecFinish { .. } => {}
            MetricsEvent::RowsScanned { entity, rows } => {
                let entry = state.entities.entry(entity.to_string()).or_default();
                entry.rows_scanned = entry.rows_scanned.saturating_add(rows);
            }
            MetricsEvent::UniqueViolation { entity } => {
                let entry = state.entities.entry(entity.to_string()).or_default();
                entry.unique_violations = entry.unique_violations.saturating_add(1);
            }
            MetricsEvent::CascadeExpanded { entity, children } => {
                let entry = state.entities.entry(entity.to_string()).or_default();
                entry.cascade_children = entry.cascade_children.saturating_add(children);
            }
            MetricsEvent::Plan { kind } => match kind {
                PlanKind::Containment => {
                    state.ops.containment_plans = state.ops.containment_plans.saturating_add(1);
                }
                PlanKind::FullScan => {
                    state.ops.full_scan_plans = state.ops.full_scan_plans.saturating_add(1);
                }
            },
        });
    }
}

static GLOBAL_SINK: GlobalMetricsSink = GlobalMetricsSink;

/// Record one event through the active sink.
pub(crate) fn record(event: MetricsEvent) {
    let sink = SINK_OVERRIDE.with_borrow(|current| current.unwrap_or(&GLOBAL_SINK));
    sink.record(event);
}

/// Run a closure with a scoped sink override on this thread.
pub fn with_metrics_sink<T>(sink: &'static dyn MetricsSink, f: impl FnOnce() -> T) -> T {
    let previous = SINK_OVERRIDE.with_borrow_mut(|current| current.replace(sink));
    let result = f();
    SINK_OVERRIDE.with_borrow_mut(|current| *current = previous);

    result
}

/// Snapshot the process-local counter state.
#[must_use]
pub fn metrics_report() -> MetricsReport {
    metrics::snapshot()
}

/// Reset the process-local counter state.
pub fn metrics_reset_all() {
    metrics::reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_sink_accumulates_counters() {
        metrics_reset_all();
        record(MetricsEvent::ExecStart {
            kind: ExecKind::Flush,
            entity: "screening",
        });
        record(MetricsEvent::ExecFinish {
            kind: ExecKind::Flush,
            entity: "screening",
            rows_touched: 4,
        });
        record(MetricsEvent::RowsScanned {
            entity: "screening",
            rows: 2,
        });

        let report = metrics_report();
        assert_eq!(report.ops.flush_calls, 1);
        let entity = &report.entities["screening"];
        assert_eq!(entity.rows_written, 4);
        assert_eq!(entity.rows_scanned, 2);
        metrics_reset_all();
    }

    #[test]
    fn scoped_override_captures_events() {
        use std::sync::Mutex;

        struct CapturingSink(Mutex<Vec<&'static str>>);
        impl MetricsSink for CapturingSink {
            fn record(&self, event: MetricsEvent) {
                if let MetricsEvent::UniqueViolation { entity } = event {
                    self.0.lock().unwrap().push(entity);
                }
            }
        }

        let sink: &'static CapturingSink =
            Box::leak(Box::new(CapturingSink(Mutex::new(Vec::new()))));

        metrics_reset_all();
        with_metrics_sink(sink, || {
            record(MetricsEvent::UniqueViolation { entity: "drill" });
        });
        record(MetricsEvent::UniqueViolation { entity: "screening" });

        assert_eq!(*sink.0.lock().unwrap(), vec!["drill"]);
        let report = metrics_report();
        assert_eq!(report.entities["screening"].unique_violations, 1);
        assert!(!report.entities.contains_key("drill"));
        metrics_reset_all();
    }
}
