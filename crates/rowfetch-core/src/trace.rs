#![forbid(unsafe_code)]

//! Event trace for bind/commit lifecycles.
//!
//! The trace is a test-facing audit log: the coordinator records one
//! [`LoadEvent`] per observable transition, in UI-thread order, and the
//! test suite checks the recorded sequence against the properties the
//! coordinator must uphold. It carries no behavior of its own — disabling
//! it changes nothing about loading.
//!
//! # Events
//!
//! Every bind is assigned a strictly increasing [`BindId`]. A bind's
//! lifecycle produces:
//!
//! - `Bound` when the coordinator accepts the bind, then at most one of
//! - `Committed` (the fetch result was written to the slot),
//! - `StaleDiscarded` (the fetch completed but the task had been
//!   superseded; the result was dropped at the commit-time check), or
//! - `FetchFailed` (the fetch returned an error; commit suppressed).
//!
//! A bind whose task is skipped while still pending produces no terminal
//! event: its body never ran.
//!
//! # Invariants
//!
//! 1. `Bound` ids are strictly increasing.
//! 2. Each bind has at most one terminal event, recorded after its
//!    `Bound`.
//! 3. **No stale commit**: a `Committed` for slot S must not appear after
//!    a later `Bound` for S. This is the detector the suite uses to prove
//!    the stale-write property, including on deliberately racy negative
//!    cases.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::model::RowKey;
use crate::slot::SlotId;

/// Strictly increasing identity of one `bind(slot, key)` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindId(u64);

impl BindId {
    /// Create a bind id from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BindId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bind#{}", self.0)
    }
}

/// One observed event in a slot's load lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoadEvent {
    /// The coordinator accepted a bind for `slot` → `key`.
    Bound {
        slot: SlotId,
        key: RowKey,
        bind: BindId,
    },
    /// The bind's fetch result was committed to the slot.
    Committed {
        slot: SlotId,
        key: RowKey,
        bind: BindId,
    },
    /// The bind's fetch completed but was superseded; result discarded.
    StaleDiscarded {
        slot: SlotId,
        key: RowKey,
        bind: BindId,
    },
    /// The bind's fetch failed; commit suppressed, previous text kept.
    FetchFailed {
        slot: SlotId,
        key: RowKey,
        bind: BindId,
    },
}

impl LoadEvent {
    /// The slot this event belongs to.
    #[must_use]
    pub fn slot(&self) -> SlotId {
        match self {
            Self::Bound { slot, .. }
            | Self::Committed { slot, .. }
            | Self::StaleDiscarded { slot, .. }
            | Self::FetchFailed { slot, .. } => *slot,
        }
    }

    /// The key this event belongs to.
    #[must_use]
    pub fn key(&self) -> RowKey {
        match self {
            Self::Bound { key, .. }
            | Self::Committed { key, .. }
            | Self::StaleDiscarded { key, .. }
            | Self::FetchFailed { key, .. } => *key,
        }
    }

    /// The bind this event belongs to.
    #[must_use]
    pub fn bind(&self) -> BindId {
        match self {
            Self::Bound { bind, .. }
            | Self::Committed { bind, .. }
            | Self::StaleDiscarded { bind, .. }
            | Self::FetchFailed { bind, .. } => *bind,
        }
    }

    /// Short event-kind name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bound { .. } => "bound",
            Self::Committed { .. } => "committed",
            Self::StaleDiscarded { .. } => "stale_discarded",
            Self::FetchFailed { .. } => "fetch_failed",
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Bound { .. })
    }
}

/// Ordered log of load events, in UI-thread order.
#[derive(Debug, Clone, Default)]
pub struct LoadTrace {
    events: Vec<LoadEvent>,
}

impl LoadTrace {
    /// Create an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&mut self, event: LoadEvent) {
        self.events.push(event);
    }

    /// All recorded events.
    #[must_use]
    pub fn events(&self) -> &[LoadEvent] {
        &self.events
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop all recorded events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Keys committed to `slot`, in commit order.
    #[must_use]
    pub fn committed_keys(&self, slot: SlotId) -> Vec<RowKey> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LoadEvent::Committed { slot: s, key, .. } if *s == slot => Some(*key),
                _ => None,
            })
            .collect()
    }

    /// Whether the trace contains an event of `kind` for `bind`.
    #[must_use]
    pub fn contains(&self, bind: BindId, kind: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.bind() == bind && e.kind() == kind)
    }

    /// Count events of `kind` across the whole trace.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }

    /// Order-sensitive checksum over all events, for golden comparison.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for event in &self.events {
            event.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Verify trace invariants; returns a description per violation.
    #[must_use]
    pub fn verify_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        // Invariant 1: Bound ids strictly increase.
        let mut last_bound: Option<BindId> = None;
        for event in &self.events {
            if let LoadEvent::Bound { bind, .. } = event {
                if let Some(prev) = last_bound
                    && *bind <= prev
                {
                    violations.push(format!("non-monotonic bind id: {bind} after {prev}"));
                }
                last_bound = Some(*bind);
            }
        }

        // Invariant 2: at most one terminal event per bind, after its Bound.
        let mut bound_at: HashMap<BindId, usize> = HashMap::new();
        let mut terminal_at: HashMap<BindId, usize> = HashMap::new();
        for (idx, event) in self.events.iter().enumerate() {
            let bind = event.bind();
            if event.is_terminal() {
                if let Some(prev) = terminal_at.insert(bind, idx) {
                    violations.push(format!(
                        "{bind} resolved twice (events {prev} and {idx})"
                    ));
                }
                match bound_at.get(&bind) {
                    Some(b) if *b < idx => {}
                    _ => violations.push(format!("{bind} resolved before it was bound")),
                }
            } else {
                bound_at.insert(bind, idx);
            }
        }

        // Invariant 3: no stale commit. A commit for a slot must belong to
        // that slot's most recent bind at the moment it is recorded.
        let mut latest_bind: HashMap<SlotId, BindId> = HashMap::new();
        for event in &self.events {
            match event {
                LoadEvent::Bound { slot, bind, .. } => {
                    latest_bind.insert(*slot, *bind);
                }
                LoadEvent::Committed { slot, key, bind } => {
                    if let Some(latest) = latest_bind.get(slot)
                        && bind < latest
                    {
                        violations.push(format!(
                            "stale commit: {slot} showed key {key} from {bind} after {latest}"
                        ));
                    }
                }
                _ => {}
            }
        }

        violations
    }
}

/// Shared, thread-safe handle to a [`LoadTrace`].
///
/// Cloned into commit closures so events recorded on the UI thread land in
/// one log.
#[derive(Clone, Default)]
pub struct TraceHandle {
    inner: Arc<Mutex<LoadTrace>>,
}

impl TraceHandle {
    /// Create a handle over an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event.
    pub fn record(&self, event: LoadEvent) {
        self.inner.lock().unwrap().push(event);
    }

    /// A point-in-time copy of the trace.
    #[must_use]
    pub fn snapshot(&self) -> LoadTrace {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SlotIds are only handed out by RowSlot; allocate a real slot to get
    /// a fresh one.
    fn fresh_slot_id() -> SlotId {
        use crate::dispatch::InlineWorker;
        use crate::slot::RowSlot;
        RowSlot::new(std::sync::Arc::new(InlineWorker)).id()
    }

    fn key(n: u64) -> RowKey {
        RowKey::new(n)
    }

    #[test]
    fn clean_lifecycle_has_no_violations() {
        let s = fresh_slot_id();
        let mut trace = LoadTrace::new();
        trace.push(LoadEvent::Bound {
            slot: s,
            key: key(1),
            bind: BindId::from_raw(1),
        });
        trace.push(LoadEvent::Committed {
            slot: s,
            key: key(1),
            bind: BindId::from_raw(1),
        });
        trace.push(LoadEvent::Bound {
            slot: s,
            key: key(2),
            bind: BindId::from_raw(2),
        });
        trace.push(LoadEvent::Committed {
            slot: s,
            key: key(2),
            bind: BindId::from_raw(2),
        });
        assert!(trace.verify_invariants().is_empty());
        assert_eq!(trace.committed_keys(s), vec![key(1), key(2)]);
    }

    #[test]
    fn stale_commit_is_detected() {
        let s = fresh_slot_id();
        let mut trace = LoadTrace::new();
        trace.push(LoadEvent::Bound {
            slot: s,
            key: key(5),
            bind: BindId::from_raw(1),
        });
        trace.push(LoadEvent::Bound {
            slot: s,
            key: key(42),
            bind: BindId::from_raw(2),
        });
        trace.push(LoadEvent::Committed {
            slot: s,
            key: key(42),
            bind: BindId::from_raw(2),
        });
        // The slow fetch for key 5 lands last and writes anyway: the
        // uncoordinated pattern. The detector must flag it.
        trace.push(LoadEvent::Committed {
            slot: s,
            key: key(5),
            bind: BindId::from_raw(1),
        });
        let violations = trace.verify_invariants();
        assert!(
            violations.iter().any(|v| v.contains("stale commit")),
            "expected a stale-commit violation, got {violations:?}"
        );
    }

    #[test]
    fn double_resolution_is_detected() {
        let s = fresh_slot_id();
        let mut trace = LoadTrace::new();
        trace.push(LoadEvent::Bound {
            slot: s,
            key: key(1),
            bind: BindId::from_raw(1),
        });
        trace.push(LoadEvent::Committed {
            slot: s,
            key: key(1),
            bind: BindId::from_raw(1),
        });
        trace.push(LoadEvent::StaleDiscarded {
            slot: s,
            key: key(1),
            bind: BindId::from_raw(1),
        });
        let violations = trace.verify_invariants();
        assert!(violations.iter().any(|v| v.contains("resolved twice")));
    }

    #[test]
    fn non_monotonic_bind_ids_are_detected() {
        let s = fresh_slot_id();
        let mut trace = LoadTrace::new();
        trace.push(LoadEvent::Bound {
            slot: s,
            key: key(1),
            bind: BindId::from_raw(2),
        });
        trace.push(LoadEvent::Bound {
            slot: s,
            key: key(2),
            bind: BindId::from_raw(1),
        });
        let violations = trace.verify_invariants();
        assert!(violations.iter().any(|v| v.contains("non-monotonic")));
    }

    #[test]
    fn checksum_is_order_sensitive_and_deterministic() {
        let s = fresh_slot_id();
        let bound = LoadEvent::Bound {
            slot: s,
            key: key(1),
            bind: BindId::from_raw(1),
        };
        let committed = LoadEvent::Committed {
            slot: s,
            key: key(1),
            bind: BindId::from_raw(1),
        };

        let mut a = LoadTrace::new();
        a.push(bound.clone());
        a.push(committed.clone());

        let mut b = LoadTrace::new();
        b.push(bound.clone());
        b.push(committed.clone());
        assert_eq!(a.checksum(), b.checksum());

        let mut c = LoadTrace::new();
        c.push(committed);
        c.push(bound);
        assert_ne!(a.checksum(), c.checksum());
    }

    #[test]
    fn trace_handle_is_shareable() {
        let handle = TraceHandle::new();
        let cloned = handle.clone();
        let s = fresh_slot_id();
        cloned.record(LoadEvent::Bound {
            slot: s,
            key: key(1),
            bind: BindId::from_raw(1),
        });
        assert_eq!(handle.snapshot().len(), 1);
    }
}
