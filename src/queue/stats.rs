/// Snapshot of a queue's counters.
///
/// `pending` and `active` are gauges; `completed`, `errors` and `total` only grow.
/// Once the queue is quiet, `total == completed + errors + pending + active`.
/// Tasks rejected by `clear()` or an abort count as `errors`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks waiting to start.
    pub pending: usize,
    /// Tasks currently running.
    pub active: usize,
    /// Tasks that finished with `Ok`.
    pub completed: u64,
    /// Tasks that failed, timed out, panicked, or were cleared.
    pub errors: u64,
    /// Tasks ever admitted.
    pub total: u64,
}
