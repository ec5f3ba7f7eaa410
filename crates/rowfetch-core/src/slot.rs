#![forbid(unsafe_code)]

//! Reusable row slot.
//!
//! A slot is a visual row unit with a stable identity that represents
//! different logical items over its lifetime. The list virtualization
//! layer creates a viewport's worth of slots, then reuses them as the user
//! scrolls: [`reset`](RowSlot::reset) runs when a slot is returned for
//! reuse, and the coordinator's `bind` assigns it the next item.
//!
//! The slot's displayed text is written only by committed tasks or by
//! `reset()`, always on the UI-owning thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::dispatch::Worker;
use crate::queue::SerialTaskQueue;

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a row slot, distinct from the logical item it
/// currently represents. Strictly increasing across slot creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u64);

impl SlotId {
    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// A reusable row widget with one owned task queue.
///
/// The queue is created with the slot and dropped with it. Slots are held
/// behind `Arc` so in-flight tasks can close over them.
pub struct RowSlot {
    id: SlotId,
    text: Mutex<String>,
    queue: SerialTaskQueue,
}

impl RowSlot {
    /// Create a slot whose queue runs task bodies on `worker`.
    #[must_use]
    pub fn new(worker: Arc<dyn Worker>) -> Arc<Self> {
        Arc::new(Self {
            id: SlotId(NEXT_SLOT_ID.fetch_add(1, Ordering::SeqCst)),
            text: Mutex::new(String::new()),
            queue: SerialTaskQueue::new(worker),
        })
    }

    /// The slot's stable identity.
    #[must_use]
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// The slot's task queue, for the coordinator to cancel and submit
    /// against.
    #[must_use]
    pub fn queue(&self) -> &SerialTaskQueue {
        &self.queue
    }

    /// The currently displayed text.
    #[must_use]
    pub fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }

    /// Write the displayed text.
    ///
    /// Callable only from the UI-owning thread; committed tasks and
    /// `reset()` are the only writers.
    pub fn set_text(&self, text: impl Into<String>) {
        *self.text.lock().unwrap() = text.into();
    }

    /// Prepare the slot for reuse.
    ///
    /// Clears the displayed text synchronously, so a recycled slot never
    /// shows the previous item's content for even one frame, and cancels
    /// the slot's queue so an in-flight fetch cannot commit after the
    /// slot has been returned to the pool. Callable only from the
    /// UI-owning thread.
    pub fn reset(&self) {
        self.queue.cancel_all();
        self.text.lock().unwrap().clear();
        trace!(slot = %self.id, "reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::InlineWorker;
    use crate::model::RowKey;
    use crate::queue::{CancelToken, SlotTask};

    #[test]
    fn slot_ids_are_unique_and_increasing() {
        let worker: Arc<dyn Worker> = Arc::new(InlineWorker);
        let a = RowSlot::new(Arc::clone(&worker));
        let b = RowSlot::new(worker);
        assert!(a.id() < b.id());
    }

    #[test]
    fn set_text_replaces_displayed_text() {
        let slot = RowSlot::new(Arc::new(InlineWorker));
        assert_eq!(slot.text(), "");
        slot.set_text("42");
        assert_eq!(slot.text(), "42");
    }

    #[test]
    fn reset_clears_text_synchronously() {
        let slot = RowSlot::new(Arc::new(InlineWorker));
        slot.set_text("stale");
        slot.reset();
        assert_eq!(slot.text(), "");
    }

    /// Worker that parks jobs so a task stays in flight.
    #[derive(Default)]
    struct ParkedWorker {
        jobs: Mutex<Vec<crate::dispatch::Job>>,
    }

    impl Worker for ParkedWorker {
        fn execute(&self, job: crate::dispatch::Job) {
            self.jobs.lock().unwrap().push(job);
        }
    }

    #[test]
    fn reset_cancels_in_flight_work() {
        let worker = Arc::new(ParkedWorker::default());
        let slot = RowSlot::new(Arc::clone(&worker) as Arc<dyn Worker>);
        let token = CancelToken::new();
        slot.queue()
            .submit(SlotTask::new(RowKey::new(1), token.clone(), |done| {
                drop(done);
            }));
        slot.set_text("previous");

        slot.reset();
        assert_eq!(slot.text(), "");
        assert!(token.is_cancelled());
    }
}
