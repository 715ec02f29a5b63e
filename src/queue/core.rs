use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, TryJoinAll, try_join_all};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::QueueError;
use crate::hooks::{self, HookResult, panic_message};

use super::{
    config::QueueConfig,
    handle::TaskHandle,
    signal::{Idle, IdleSignal},
    stats::QueueStats,
};

/// Hook invoked with every failure of a task that actually ran.
pub type ErrorHook<E> = Arc<dyn Fn(&QueueError<E>) -> HookResult + Send + Sync>;

type Operation<T, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send>;
type Outcome<T, E> = Result<T, QueueError<E>>;

/// A task waiting for a free slot.
struct Pending<T, E> {
    seq: u64,
    priority: i32,
    op: Operation<T, E>,
    tx: oneshot::Sender<Outcome<T, E>>,
}

struct State<T, E> {
    pending: VecDeque<Pending<T, E>>,
    /// Set when an insertion broke priority order; sorted on next dispatch.
    unsorted: bool,
    active: usize,
    concurrency: usize,
    paused: bool,
    aborted: bool,
    next_seq: u64,
    stats: QueueStats,
    empty: IdleSignal,
    drain: IdleSignal,
}

impl<T, E> State<T, E> {
    fn sync_gauges(&mut self) {
        self.stats.pending = self.pending.len();
        self.stats.active = self.active;
    }

    fn signal_idle(&mut self) {
        if self.pending.is_empty() {
            self.empty.fire();
            if self.active == 0 {
                self.drain.fire();
            }
        }
    }

    fn take_pending(&mut self) -> Vec<Pending<T, E>> {
        let cleared: Vec<_> = self.pending.drain(..).collect();
        self.unsorted = false;
        self.stats.errors += cleared.len() as u64;
        self.sync_gauges();
        self.signal_idle();
        cleared
    }
}

struct Shared<T, E> {
    state: Mutex<State<T, E>>,
    timeout: Option<Duration>,
    on_error: Option<ErrorHook<E>>,
    signal: Option<CancellationToken>,
    /// Cancelled when the last queue handle goes away; stops the abort watcher.
    _closed: DropGuard,
}

/// Priority-aware, concurrency-limited queue of async operations.
///
/// Cheap to clone; clones share the same queue.
///
/// ### Rules
/// - At most `concurrency` operations run at once; lowering the limit never preempts.
/// - Pending tasks start in descending priority order, ties in insertion order.
/// - A failing task never stops the queue.
/// - `clear()` and aborts reject only pending tasks; running tasks finish and deliver.
/// - Every handle settles exactly once.
///
/// Operations are spawned onto the ambient tokio runtime, so `add` must be called
/// from within one.
///
/// # Example
/// ```rust
/// use corral::{QueueConfig, TaskQueue};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let queue: TaskQueue<u32, std::io::Error> = TaskQueue::new(QueueConfig::with_concurrency(2));
///
///     let low = queue.add_with_priority(|| async { Ok(1) }, 0);
///     let high = queue.add_with_priority(|| async { Ok(2) }, 10);
///
///     assert_eq!(high.await.unwrap(), 2);
///     assert_eq!(low.await.unwrap(), 1);
///     queue.on_drain().await;
///     assert!(queue.is_idle());
/// }
/// ```
pub struct TaskQueue<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for TaskQueue<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> TaskQueue<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Creates a queue without hooks or cancellation token.
    pub fn new(cfg: QueueConfig) -> Self {
        TaskQueueBuilder::new(cfg).build()
    }

    /// Enqueues `op` with priority `0`.
    pub fn add<F, Fut>(&self, op: F) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.add_with_priority(op, 0)
    }

    /// Enqueues `op`; higher `priority` starts earlier.
    ///
    /// If the queue was aborted the returned handle is already settled with
    /// [`QueueError::Aborted`] and nothing is enqueued.
    pub fn add_with_priority<F, Fut>(&self, op: F, priority: i32) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.shared.observe_signal();
        let (tx, rx) = oneshot::channel();
        {
            let mut st = self.shared.state.lock();
            if st.aborted {
                return TaskHandle::ready(Err(QueueError::Aborted));
            }

            let seq = st.next_seq;
            st.next_seq += 1;
            if st.pending.back().is_some_and(|last| last.priority < priority) {
                st.unsorted = true;
            }
            st.pending.push_back(Pending {
                seq,
                priority,
                op: Box::new(move || op().boxed()),
                tx,
            });
            st.stats.total += 1;
            st.sync_gauges();
        }

        self.shared.dispatch();
        TaskHandle::waiting(rx)
    }

    /// Enqueues every operation with priority `0`.
    ///
    /// The returned future resolves with all results in input order, or with the first
    /// failure (including `Aborted`/`Cleared`). Tasks are enqueued immediately, even if
    /// the future is never polled.
    pub fn add_all<I, F, Fut>(&self, ops: I) -> TryJoinAll<TaskHandle<T, E>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let handles: Vec<_> = ops.into_iter().map(|op| self.add(op)).collect();
        try_join_all(handles)
    }

    /// Stops starting new tasks. Running tasks are unaffected.
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
    }

    /// Resumes dispatching.
    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        self.shared.dispatch();
    }

    /// Rejects every pending task with [`QueueError::Cleared`]. Running tasks are unaffected.
    pub fn clear(&self) {
        let cleared = self.shared.state.lock().take_pending();
        if !cleared.is_empty() {
            tracing::debug!(cleared = cleared.len(), "queue cleared");
        }
        reject(cleared);
    }

    /// Aborts the queue permanently.
    ///
    /// Pending tasks are rejected with [`QueueError::Cleared`]; later `add` calls settle
    /// with [`QueueError::Aborted`]. Running tasks finish and deliver their results.
    pub fn abort(&self) {
        self.shared.abort();
    }

    /// Changes the concurrency ceiling (clamped to at least 1).
    ///
    /// Raising it starts pending tasks right away; lowering it lets running tasks finish.
    pub fn set_concurrency(&self, n: usize) {
        self.shared.state.lock().concurrency = n.max(1);
        self.shared.dispatch();
    }

    /// Current concurrency ceiling.
    pub fn concurrency(&self) -> usize {
        self.shared.state.lock().concurrency
    }

    /// Number of pending (not yet started) tasks.
    pub fn size(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Number of running tasks.
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active
    }

    /// True while paused.
    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// True once aborted.
    pub fn is_aborted(&self) -> bool {
        self.shared.observe_signal();
        self.shared.state.lock().aborted
    }

    /// True if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().pending.is_empty()
    }

    /// True if nothing is pending and nothing is running.
    pub fn is_idle(&self) -> bool {
        let st = self.shared.state.lock();
        st.pending.is_empty() && st.active == 0
    }

    /// Resolves the next time the pending list becomes empty (immediately if it is).
    pub fn on_empty(&self) -> Idle {
        let mut st = self.shared.state.lock();
        if st.pending.is_empty() {
            Idle::ready()
        } else {
            st.empty.wait()
        }
    }

    /// Resolves the next time the queue is fully idle (immediately if it is).
    pub fn on_drain(&self) -> Idle {
        let mut st = self.shared.state.lock();
        if st.pending.is_empty() && st.active == 0 {
            Idle::ready()
        } else {
            st.drain.wait()
        }
    }

    /// Copy of the queue counters.
    pub fn stats(&self) -> QueueStats {
        self.shared.state.lock().stats
    }
}

impl<T, E> Shared<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Starts as many pending tasks as the current state allows.
    ///
    /// No-op while paused, aborted, at capacity, or empty.
    fn dispatch(self: &Arc<Self>) {
        self.observe_signal();
        let launched = {
            let mut st = self.state.lock();
            let mut launched = Vec::new();

            while !st.paused && !st.aborted && st.active < st.concurrency {
                if st.unsorted {
                    st.pending
                        .make_contiguous()
                        .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
                    st.unsorted = false;
                }
                let Some(task) = st.pending.pop_front() else {
                    break;
                };
                st.active += 1;
                launched.push(task);
            }

            if !launched.is_empty() {
                st.sync_gauges();
                if st.pending.is_empty() {
                    st.empty.fire();
                }
            }
            launched
        };

        for task in launched {
            tracing::trace!(seq = task.seq, priority = task.priority, "starting task");
            self.launch(task);
        }
    }

    fn launch(self: &Arc<Self>, task: Pending<T, E>) {
        let Pending { op, tx, .. } = task;
        let timeout = self.timeout;
        let shared = Arc::clone(self);

        tokio::spawn(async move {
            let run = async move {
                match timeout {
                    Some(dur) => match time::timeout(dur, op()).await {
                        Ok(res) => res.map_err(QueueError::Operation),
                        Err(_elapsed) => Err(QueueError::Timeout { timeout: dur }),
                    },
                    None => op().await.map_err(QueueError::Operation),
                }
            };

            let outcome = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(QueueError::Panicked {
                    message: panic_message(payload.as_ref()),
                }),
            };
            shared.settle(outcome, tx);
        });
    }

    fn settle(self: &Arc<Self>, outcome: Outcome<T, E>, tx: oneshot::Sender<Outcome<T, E>>) {
        {
            let mut st = self.state.lock();
            st.active -= 1;
            match &outcome {
                Ok(_) => st.stats.completed += 1,
                Err(_) => st.stats.errors += 1,
            }
            st.sync_gauges();
            st.signal_idle();
        }

        if let Err(err) = &outcome {
            tracing::debug!(error = err.as_label(), "task failed");
            if let Some(hook) = &self.on_error {
                hooks::invoke("queue", "on_error", || hook(err));
            }
        }

        let _ = tx.send(outcome);
        self.dispatch();
    }

    /// Aborts if the cancellation token fired before the watcher task got to run.
    fn observe_signal(&self) {
        if self.signal.as_ref().is_some_and(CancellationToken::is_cancelled) {
            self.abort();
        }
    }

    fn abort(&self) {
        let cleared = {
            let mut st = self.state.lock();
            if st.aborted {
                return;
            }
            st.aborted = true;
            st.take_pending()
        };
        tracing::debug!(cleared = cleared.len(), "queue aborted");
        reject(cleared);
    }
}

fn reject<T, E>(tasks: Vec<Pending<T, E>>) {
    for task in tasks {
        let _ = task.tx.send(Err(QueueError::Cleared));
    }
}

/// Builder for [`TaskQueue`] with optional error hook and cancellation token.
pub struct TaskQueueBuilder<E> {
    cfg: QueueConfig,
    on_error: Option<ErrorHook<E>>,
    signal: Option<CancellationToken>,
}

impl<E> TaskQueueBuilder<E>
where
    E: Send + 'static,
{
    /// Creates a builder with the given configuration.
    pub fn new(cfg: QueueConfig) -> Self {
        Self {
            cfg,
            on_error: None,
            signal: None,
        }
    }

    /// Sets a hook called with every failure of a task that ran
    /// (operation error, timeout, panic). Its own failures are logged and ignored.
    pub fn on_error<H>(mut self, hook: H) -> Self
    where
        H: Fn(&QueueError<E>) -> HookResult + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Aborts the queue when `token` is cancelled.
    ///
    /// A token that is already cancelled yields an aborted queue. Otherwise a watcher
    /// task is spawned, so `build` must then run inside a tokio runtime.
    pub fn with_signal(mut self, token: CancellationToken) -> Self {
        self.signal = Some(token);
        self
    }

    /// Builds the queue.
    pub fn build<T>(self) -> TaskQueue<T, E>
    where
        T: Send + 'static,
    {
        let closed = CancellationToken::new();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                unsorted: false,
                active: 0,
                concurrency: self.cfg.concurrency_limit(),
                paused: !self.cfg.autostart,
                aborted: false,
                next_seq: 0,
                stats: QueueStats::default(),
                empty: IdleSignal::default(),
                drain: IdleSignal::default(),
            }),
            timeout: self.cfg.task_timeout(),
            on_error: self.on_error,
            signal: self.signal.clone(),
            _closed: closed.clone().drop_guard(),
        });

        if let Some(token) = self.signal {
            if token.is_cancelled() {
                shared.abort();
            } else {
                spawn_abort_watcher(Arc::downgrade(&shared), token, closed);
            }
        }

        TaskQueue { shared }
    }
}

fn spawn_abort_watcher<T, E>(
    shared: Weak<Shared<T, E>>,
    token: CancellationToken,
    closed: CancellationToken,
) where
    T: Send + 'static,
    E: Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {
                if let Some(shared) = shared.upgrade() {
                    shared.abort();
                }
            }
            _ = closed.cancelled() => {}
        }
    });
}
