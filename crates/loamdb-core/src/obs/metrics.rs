use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock, PoisonError};

///
/// EventState
/// Ephemeral, in-process counters for operations and per-index utilization.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub indexes: BTreeMap<String, IndexCounters>,
    pub window_start_ms: i64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            indexes: BTreeMap::new(),
            window_start_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Mutation entrypoints
    pub insert_calls: u64,
    pub update_calls: u64,
    pub delete_calls: u64,
    pub find_calls: u64,

    // Planner kinds
    pub plan_index: u64,
    pub plan_full_scan: u64,

    // Rows touched
    pub rows_scanned: u64,

    // Index maintenance
    pub index_inserts: u64,
    pub index_removes: u64,
    pub unique_violations: u64,

    // Builder lifecycle
    pub builds_started: u64,
    pub builds_ready: u64,
    pub builds_aborted: u64,
}

///
/// IndexCounters
/// Per-index monotonic utilization counters.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IndexCounters {
    pub accesses: u64,
    pub unique_violations: u64,
}

fn state() -> &'static Mutex<EventState> {
    static STATE: OnceLock<Mutex<EventState>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(EventState::default()))
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    let guard = state().lock().unwrap_or_else(PoisonError::into_inner);
    f(&guard)
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    let mut guard = state().lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Reset all event state, restarting the observation window.
pub fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Snapshot the current counters.
#[must_use]
pub fn report() -> EventState {
    with_state(Clone::clone)
}
