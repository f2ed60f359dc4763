use std::{cell::RefCell, collections::BTreeMap};

thread_local! {
    static STATE: RefCell<MetricsReport> = RefCell::new(MetricsReport::default());
}

///
/// OpCounters
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OpCounters {
    pub persist_calls: u64,
    pub flush_calls: u64,
    pub find_calls: u64,
    pub containment_plans: u64,
    pub full_scan_plans: u64,
}

///
/// EntityCounters
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EntityCounters {
    pub rows_written: u64,
    pub rows_scanned: u64,
    pub unique_violations: u64,
    pub cascade_children: u64,
}

///
/// MetricsReport
///
/// Point-in-time snapshot of the process-local counter state.
///

#[derive(Clone, Debug, Default)]
pub struct MetricsReport {
    pub ops: OpCounters,
    pub entities: BTreeMap<String, EntityCounters>,
}

pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut MetricsReport) -> R) -> R {
    STATE.with_borrow_mut(f)
}

pub(crate) fn snapshot() -> MetricsReport {
    STATE.with_borrow(Clone::clone)
}

pub(crate) fn reset() {
    STATE.with_borrow_mut(|state| *state = MetricsReport::default());
}
