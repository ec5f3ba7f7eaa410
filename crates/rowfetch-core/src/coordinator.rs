#![forbid(unsafe_code)]

//! The bind coordinator.
//!
//! `bind(slot, key)` is the one entry point the list virtualization layer
//! calls when a slot is about to display an item. It guarantees that
//! whatever the slot eventually shows corresponds to the most recent bind,
//! even though fetches run concurrently and complete in arbitrary order.
//!
//! The guarantee is double-gated:
//!
//! 1. **Queue-level**: `bind` first calls `cancel_all()` on the slot's
//!    queue, superseding every previously admitted task, and the queue
//!    serializes commit-time critical sections.
//! 2. **Commit-time**: each task carries a private [`CancelToken`]
//!    re-checked on the UI thread at the last possible moment, after the
//!    fetch has completed. The queue serializes commits, but the fetch
//!    itself overlaps newer binds; by the time a slow fetch lands, a newer
//!    task may already have been admitted. The token check closes that
//!    window.
//!
//! The check-then-write pair is atomic with respect to the UI context:
//! only the UI thread runs commit closures, and `bind`/`reset` are called
//! from it, so no cancellation can interleave between check and write.
//!
//! # Failure modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Fetch completes after a newer bind | Result discarded at commit time |
//! | Fetch fails | Commit suppressed, previous text kept, `warn` logged |
//! | Task still pending when superseded | Skipped; its body never runs |
//!
//! Nothing here returns an error: every failure degrades to "no visual
//! update" for the affected slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::dispatch::UiHandle;
use crate::model::{RowKey, RowModel};
use crate::queue::{CancelToken, SlotTask};
use crate::slot::RowSlot;
use crate::trace::{BindId, LoadEvent, TraceHandle};

/// Coordinates slot↔item binds so that the latest bind always wins.
///
/// One coordinator serves any number of slots; all per-slot state lives in
/// the slots' own queues. Collaborators are injected at construction so
/// tests can substitute deterministic ones.
pub struct LoadCoordinator {
    model: Arc<dyn RowModel>,
    ui: UiHandle,
    trace: Option<TraceHandle>,
    next_bind: AtomicU64,
}

impl LoadCoordinator {
    /// Create a coordinator that fetches from `model` and commits through
    /// `ui`.
    #[must_use]
    pub fn new(model: Arc<dyn RowModel>, ui: UiHandle) -> Self {
        Self {
            model,
            ui,
            trace: None,
            next_bind: AtomicU64::new(1),
        }
    }

    /// Record load events into `trace`.
    #[must_use]
    pub fn with_trace(mut self, trace: TraceHandle) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Assign `slot` to represent `key`.
    ///
    /// Cancels the slot's stale work, then submits a task that fetches
    /// `key` on the background pool and, if still current when the fetch
    /// lands, commits the result on the UI thread. Must be called from the
    /// UI-owning thread.
    pub fn bind(&self, slot: &Arc<RowSlot>, key: RowKey) {
        slot.queue().cancel_all();

        let bind = BindId::from_raw(self.next_bind.fetch_add(1, Ordering::SeqCst));
        debug!(slot = %slot.id(), %key, %bind, "bind");
        if let Some(trace) = &self.trace {
            trace.record(LoadEvent::Bound {
                slot: slot.id(),
                key,
                bind,
            });
        }

        let token = CancelToken::new();
        let task = SlotTask::new(key, token.clone(), {
            let model = Arc::clone(&self.model);
            let ui = self.ui.clone();
            let slot = Arc::clone(slot);
            let load_trace = self.trace.clone();
            move |done| {
                // Background worker: the only blocking step.
                let fetched = model.fetch(key);

                // UI thread: re-check currency, then write. The guard is
                // moved into the closure so the slot's queue stays busy
                // until the commit decision has run.
                ui.post(move || {
                    let _done = done;
                    if token.is_cancelled() {
                        trace!(slot = %slot.id(), %key, "discarding stale result");
                        if let Some(t) = &load_trace {
                            t.record(LoadEvent::StaleDiscarded {
                                slot: slot.id(),
                                key,
                                bind,
                            });
                        }
                        return;
                    }
                    match fetched {
                        Ok(text) => {
                            slot.set_text(text);
                            trace!(slot = %slot.id(), %key, "committed");
                            if let Some(t) = &load_trace {
                                t.record(LoadEvent::Committed {
                                    slot: slot.id(),
                                    key,
                                    bind,
                                });
                            }
                        }
                        Err(err) => {
                            warn!(slot = %slot.id(), %key, %err, "fetch failed; keeping previous text");
                            if let Some(t) = &load_trace {
                                t.record(LoadEvent::FetchFailed {
                                    slot: slot.id(),
                                    key,
                                    bind,
                                });
                            }
                        }
                    }
                });
            }
        });

        slot.queue().submit(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{InlineWorker, UiQueue, Worker};
    use crate::model::FetchError;

    fn harness() -> (UiQueue, Arc<dyn Worker>) {
        (UiQueue::new(), Arc::new(InlineWorker))
    }

    fn counting_model() -> Arc<dyn RowModel> {
        Arc::new(|key: RowKey| Ok::<_, FetchError>(format!("{key}")))
    }

    #[test]
    fn bind_commits_fetch_result() {
        let (ui, worker) = harness();
        let slot = RowSlot::new(worker);
        let coordinator = LoadCoordinator::new(counting_model(), ui.handle());

        coordinator.bind(&slot, RowKey::new(7));
        assert_eq!(slot.text(), "", "commit must wait for the UI thread");
        ui.drain();
        assert_eq!(slot.text(), "7");
    }

    #[test]
    fn rebind_supersedes_previous_task() {
        let (ui, worker) = harness();
        let slot = RowSlot::new(worker);
        let trace = TraceHandle::new();
        let coordinator =
            LoadCoordinator::new(counting_model(), ui.handle()).with_trace(trace.clone());

        coordinator.bind(&slot, RowKey::new(5));
        coordinator.bind(&slot, RowKey::new(42));
        ui.drain();

        assert_eq!(slot.text(), "42");
        let snapshot = trace.snapshot();
        assert_eq!(snapshot.committed_keys(slot.id()), vec![RowKey::new(42)]);
        assert_eq!(snapshot.count("stale_discarded"), 1);
        assert!(snapshot.verify_invariants().is_empty());
    }

    #[test]
    fn failed_fetch_keeps_previous_text() {
        let (ui, worker) = harness();
        let slot = RowSlot::new(worker);
        let trace = TraceHandle::new();
        let model: Arc<dyn RowModel> = Arc::new(|key: RowKey| {
            if key.raw() == 13 {
                Err(FetchError::new(key, "unlucky"))
            } else {
                Ok(format!("{key}"))
            }
        });
        let coordinator = LoadCoordinator::new(model, ui.handle()).with_trace(trace.clone());

        coordinator.bind(&slot, RowKey::new(1));
        ui.drain();
        assert_eq!(slot.text(), "1");

        coordinator.bind(&slot, RowKey::new(13));
        ui.drain();
        assert_eq!(slot.text(), "1", "failed fetch must not clear the slot");
        assert_eq!(trace.snapshot().count("fetch_failed"), 1);
    }

    #[test]
    fn reset_before_commit_suppresses_the_write() {
        let (ui, worker) = harness();
        let slot = RowSlot::new(worker);
        let coordinator = LoadCoordinator::new(counting_model(), ui.handle());

        coordinator.bind(&slot, RowKey::new(9));
        // Commit closure is queued on the UI thread; the slot is recycled
        // before it runs.
        slot.reset();
        ui.drain();
        assert_eq!(slot.text(), "");
    }

    #[test]
    fn bind_ids_increase_across_slots() {
        let (ui, worker) = harness();
        let a = RowSlot::new(Arc::clone(&worker));
        let b = RowSlot::new(worker);
        let trace = TraceHandle::new();
        let coordinator =
            LoadCoordinator::new(counting_model(), ui.handle()).with_trace(trace.clone());

        coordinator.bind(&a, RowKey::new(1));
        coordinator.bind(&b, RowKey::new(2));
        coordinator.bind(&a, RowKey::new(3));
        ui.drain();

        let snapshot = trace.snapshot();
        assert!(snapshot.verify_invariants().is_empty());
        let bound: Vec<_> = snapshot
            .events()
            .iter()
            .filter(|e| e.kind() == "bound")
            .map(LoadEvent::bind)
            .collect();
        assert_eq!(bound.len(), 3);
        assert!(bound[0] < bound[1] && bound[1] < bound[2]);
    }
}
