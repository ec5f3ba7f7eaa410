#![forbid(unsafe_code)]

//! Viewport-sized slot pool with reuse.
//!
//! This is the demo's stand-in for a list virtualization layer: it keeps
//! one [`RowSlot`] per visible line and reuses them as the viewport moves.
//! A slot leaving the top of the screen is the same slot that reappears at
//! the bottom — exactly the reuse that makes stale async writes visible
//! when loading is uncoordinated.
//!
//! The recycler knows nothing about *how* rows load. It calls
//! [`RowSlot::reset`] when a slot changes rows and hands the slot to a
//! caller-supplied bind function; the app plugs in the blocking, racy, or
//! coordinated stage there.

use std::sync::Arc;

use rowfetch_core::{RowSlot, Worker};

/// A fixed pool of row slots mapped onto a moving visible range.
pub struct SlotRecycler {
    slots: Vec<Arc<RowSlot>>,
    /// Row currently represented by each slot, if any.
    assigned: Vec<Option<u64>>,
}

impl SlotRecycler {
    /// Create a pool with one slot per visible row.
    #[must_use]
    pub fn new(worker: &Arc<dyn Worker>, viewport_rows: usize) -> Self {
        let viewport_rows = viewport_rows.max(1);
        Self {
            slots: (0..viewport_rows)
                .map(|_| RowSlot::new(Arc::clone(worker)))
                .collect(),
            assigned: vec![None; viewport_rows],
        }
    }

    /// Number of slots in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool is empty. It never is; present for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Replace the pool to match a new viewport height.
    ///
    /// Old slots are dropped; in-flight tasks keep them alive until their
    /// commits resolve, harmlessly, off screen.
    pub fn resize(&mut self, worker: &Arc<dyn Worker>, viewport_rows: usize) {
        *self = Self::new(worker, viewport_rows);
    }

    /// The pool index representing an absolute row.
    fn slot_index(&self, row: u64) -> usize {
        (row % self.slots.len() as u64) as usize
    }

    /// Make the slots represent rows `first_row..first_row + len()`.
    ///
    /// For each slot whose row changed: reset it (the reuse hook), record
    /// the new assignment, and call `bind` to start loading. Slots already
    /// showing their row are left alone, so scrolling by one line rebinds
    /// one slot, not a screenful.
    pub fn assign(&mut self, first_row: u64, total_rows: u64, mut bind: impl FnMut(&Arc<RowSlot>, u64)) {
        for offset in 0..self.slots.len() as u64 {
            let row = first_row + offset;
            if row >= total_rows {
                break;
            }
            let idx = self.slot_index(row);
            if self.assigned[idx] != Some(row) {
                self.slots[idx].reset();
                self.assigned[idx] = Some(row);
                bind(&self.slots[idx], row);
            }
        }
    }

    /// The slot currently representing `row`, if it is in the viewport.
    #[must_use]
    pub fn slot_for_row(&self, row: u64) -> Option<&Arc<RowSlot>> {
        if self.slots.is_empty() {
            return None;
        }
        let idx = self.slot_index(row);
        (self.assigned[idx] == Some(row)).then(|| &self.slots[idx])
    }
}
