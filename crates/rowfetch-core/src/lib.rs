#![forbid(unsafe_code)]

//! Glitch-free async loading for reusable list rows.
//!
//! A scrollable list keeps a viewport's worth of reusable row slots and
//! rebinds them to different items as the user scrolls. Each row's content
//! comes from a slow data source, so fetches must run off the UI thread —
//! and the moment they do, two bugs appear: a recycled row can display the
//! *previous* item's result when its old fetch finally lands, and two
//! in-flight fetches for the same row can race each other's writes.
//!
//! This crate is the coordination core that makes the pattern safe:
//!
//! # Key Components
//!
//! - [`RowSlot`] - a reusable row with a stable identity, a displayed-text
//!   field, and one owned task queue
//! - [`SerialTaskQueue`] - per-slot serialized, cancellable execution:
//!   max concurrency 1, cancel-on-replace
//! - [`LoadCoordinator`] - binds slots to items with double-gated
//!   cancellation (queue-level `cancel_all` plus a per-task
//!   [`CancelToken`] re-checked at commit time on the UI thread)
//! - [`ThreadPool`] / [`UiQueue`] - the injected execution contexts:
//!   background workers for fetches, a single-consumer queue for the
//!   UI-owning thread
//! - [`RowModel`] - the opaque slow lookup collaborator
//! - [`LoadTrace`] - a test-facing event log with invariant checking
//!
//! # Guarantee
//!
//! For any slot bound to keys `k1, k2, …, kn` in that order, the slot's
//! final displayed text is `fetch(kn)`'s result — never an earlier key's,
//! no matter how fetch latencies interleave. A superseded task's fetch may
//! still run to completion (cancellation is cooperative), but its commit
//! is always suppressed.
//!
//! # How it fits together
//!
//! The list virtualization layer is external: it owns slot creation and
//! reuse, calling [`RowSlot::reset`] when recycling a slot and
//! [`LoadCoordinator::bind`] when assigning it an item. The data source is
//! external too, behind [`RowModel`]. Everything in between — cancel,
//! serialize, fetch, gate, commit — is this crate.

pub mod coordinator;
pub mod dispatch;
pub mod model;
pub mod queue;
pub mod slot;
pub mod trace;

pub use coordinator::LoadCoordinator;
pub use dispatch::{InlineWorker, Job, PoolConfig, ThreadPool, UiHandle, UiQueue, Worker};
pub use model::{FetchError, RowKey, RowModel};
pub use queue::{CancelToken, SerialTaskQueue, SlotTask, TaskDone};
pub use slot::{RowSlot, SlotId};
pub use trace::{BindId, LoadEvent, LoadTrace, TraceHandle};
