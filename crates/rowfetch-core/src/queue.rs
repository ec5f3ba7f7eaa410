#![forbid(unsafe_code)]

//! Per-slot serialized, cancellable task queue.
//!
//! Each row slot owns exactly one [`SerialTaskQueue`]. The queue enforces
//! two guarantees for that slot:
//!
//! 1. **Serialization**: at most one *uncancelled* task is ever admitted to
//!    run; the next task starts only after its predecessor resolves or is
//!    skipped. Commit-time critical sections never interleave — they all
//!    run on the UI thread, and an uncancelled predecessor holds the queue
//!    (via its completion guard) until its commit has run.
//! 2. **Cancel-on-replace**: [`cancel_all`](SerialTaskQueue::cancel_all)
//!    marks the running task and every pending task cancelled. Cancelled
//!    pending tasks are skipped without running their bodies. A cancelled
//!    in-flight task keeps fetching (cancellation is cooperative) but
//!    counts as skipped for admission: the next submit starts immediately
//!    rather than waiting out a fetch whose result is already doomed. The
//!    zombie's eventual commit is suppressed by the commit-time token
//!    check.
//!
//! # Invariants
//!
//! 1. After any `cancel_all()` + `submit(t)` pair, `t` is the only
//!    uncancelled task the queue has admitted and not yet resolved.
//! 2. Cancellation only ever transitions a token false→true; cancelling a
//!    finished or already-cancelled task is a no-op.
//! 3. The queue never blocks the submitting thread: `submit` dispatches to
//!    the background worker and returns.
//! 4. A superseded task's completion guard cannot release a successor's
//!    hold on the queue (guards are matched to the run they belong to).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::dispatch::Worker;
use crate::model::RowKey;

/// Cooperative cancellation flag shared between a task and its queue.
///
/// Set from the UI-owning thread, read from any thread. Transitions
/// false→true exactly once; further cancels are no-ops.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the token cancelled. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One fetch-and-commit unit of work owned by a slot queue.
///
/// Carries the key it was created for, its private cancellation token, and
/// a body that receives a [`TaskDone`] guard. The body runs on a
/// background worker; it must keep the guard alive until its commit-time
/// critical section has run (move it into the commit closure), because
/// dropping the guard releases the queue to start the next task.
pub struct SlotTask {
    key: RowKey,
    token: CancelToken,
    body: Box<dyn FnOnce(TaskDone) + Send + 'static>,
}

impl SlotTask {
    /// Create a task for `key` gated by `token`.
    #[must_use]
    pub fn new(
        key: RowKey,
        token: CancelToken,
        body: impl FnOnce(TaskDone) + Send + 'static,
    ) -> Self {
        Self {
            key,
            token,
            body: Box::new(body),
        }
    }

    /// The key this task was created for.
    #[must_use]
    pub fn key(&self) -> RowKey {
        self.key
    }

    /// The task's cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

/// Completion guard handed to each running task body.
///
/// Dropping it tells the owning queue the task has resolved (committed,
/// suppressed, or failed) and lets the next pending task start. Dropped on
/// panic too, so a misbehaving body cannot wedge its slot's queue. A guard
/// belonging to a superseded run has no effect on its successor.
pub struct TaskDone {
    queue: Arc<QueueInner>,
    run_id: u64,
}

impl Drop for TaskDone {
    fn drop(&mut self) {
        QueueInner::task_finished(&self.queue, self.run_id);
    }
}

/// Serialized, cancellable task queue scoped to one row slot.
pub struct SerialTaskQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    worker: Arc<dyn Worker>,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<SlotTask>,
    /// The task currently holding the queue, if any.
    running: Option<RunningTask>,
    next_run_id: u64,
}

struct RunningTask {
    run_id: u64,
    token: CancelToken,
}

impl SerialTaskQueue {
    /// Create a queue that runs task bodies on `worker`.
    #[must_use]
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                worker,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Mark the running task and every pending task cancelled.
    ///
    /// Pending cancelled tasks are dropped without running. The in-flight
    /// task (if any) keeps running but releases its hold on the queue; its
    /// commit is suppressed by the commit-time check. Idempotent, and a
    /// no-op for tasks that already resolved.
    pub fn cancel_all(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(running) = state.running.take() {
            trace!("cancelling in-flight task");
            running.token.cancel();
        }
        for task in &state.pending {
            trace!(key = %task.key(), "skipping cancelled pending task");
            task.token.cancel();
        }
        state.pending.clear();
    }

    /// Admit `task` for execution after the current task resolves or is
    /// skipped.
    ///
    /// If the queue is not held by an uncancelled task, the body is
    /// dispatched to the background worker immediately.
    pub fn submit(&self, task: SlotTask) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.pending.push_back(task);
        }
        QueueInner::pump(&self.inner);
    }

    /// Whether the queue has neither a held run nor a pending task.
    ///
    /// A cancelled in-flight body may still be executing wastefully while
    /// the queue reports idle; only its commit is outstanding, and that
    /// commit is already doomed.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        state.running.is_none() && state.pending.is_empty()
    }
}

impl QueueInner {
    /// Start the next runnable task if the queue is not held.
    ///
    /// Tasks cancelled while still pending are skipped here, without their
    /// bodies ever running.
    fn pump(this: &Arc<Self>) {
        let (task, run_id) = {
            let mut state = this.state.lock().unwrap();
            if state.running.is_some() {
                return;
            }
            let task = loop {
                match state.pending.pop_front() {
                    Some(task) if task.token.is_cancelled() => continue,
                    Some(task) => break Some(task),
                    None => break None,
                }
            };
            let Some(task) = task else { return };
            state.next_run_id += 1;
            let run_id = state.next_run_id;
            state.running = Some(RunningTask {
                run_id,
                token: task.token.clone(),
            });
            (task, run_id)
        };

        trace!(key = %task.key(), "starting slot task");
        let done = TaskDone {
            queue: Arc::clone(this),
            run_id,
        };
        let body = task.body;
        this.worker.execute(Box::new(move || body(done)));
    }

    /// Release the queue when the run holding it resolves.
    ///
    /// Guards from superseded runs arrive here too (a zombie fetch
    /// eventually finishes); they must not release a successor's hold.
    fn task_finished(this: &Arc<Self>, run_id: u64) {
        {
            let mut state = this.state.lock().unwrap();
            let holds_queue = state
                .running
                .as_ref()
                .is_some_and(|running| running.run_id == run_id);
            if !holds_queue {
                return;
            }
            state.running = None;
        }
        Self::pump(this);
    }
}
