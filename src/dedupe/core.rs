use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DedupeError;
use crate::hooks::panic_message;

use super::{
    config::DedupeConfig,
    key::{KeyFn, custom_key, json_key, namespaced},
    record::{Record, SharedCall},
    sweep::{spawn_sweeper, sweep_period},
};

type CallFn<A, T, E> =
    Arc<dyn Fn(A, CancellationToken) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

struct State<T, E> {
    records: HashMap<String, Record<T, E>>,
    next_generation: u64,
    sweeper: Option<JoinHandle<()>>,
}

struct Inner<A, T, E> {
    call: CallFn<A, T, E>,
    key: KeyFn<A>,
    cfg: DedupeConfig,
    state: Mutex<State<T, E>>,
}

impl<A, T, E> Inner<A, T, E> {
    /// Removes the record for `key` if it still belongs to `generation`.
    fn settle(&self, key: &str, generation: u64) {
        let mut st = self.state.lock();
        if st.records.get(key).is_some_and(|r| r.generation == generation) {
            st.records.remove(key);
        }
    }

    /// Aborts records older than `max_age`. Returns `false` once nothing is left to watch.
    fn sweep(&self, max_age: Duration) -> bool {
        let now = Instant::now();
        let (stale, keep_running) = {
            let mut st = self.state.lock();
            let keys: Vec<String> = st
                .records
                .iter()
                .filter(|(_, rec)| rec.age(now) > max_age)
                .map(|(key, _)| key.clone())
                .collect();
            let stale: Vec<_> = keys
                .into_iter()
                .filter_map(|key| st.records.remove(&key).map(|rec| (key, rec)))
                .collect();
            let keep_running = !st.records.is_empty();
            if !keep_running {
                st.sweeper = None;
            }
            (stale, keep_running)
        };

        for (key, rec) in stale {
            tracing::debug!(key = %key, age = ?rec.age(now), "aborting stale in-flight call");
            rec.token.cancel();
        }
        keep_running
    }
}

/// Coalesces concurrent calls that share a key into one invocation.
///
/// Each call derives a key from its arguments (compact JSON by default). While an
/// invocation for that key is in flight, further calls subscribe to it instead of
/// starting another one, and every subscriber receives the same outcome.
///
/// Cheap to clone; clones share the same in-flight map. Invocations are driven by a
/// spawned tokio task, so `call` must run inside a runtime, and an invocation finishes
/// (and leaves the map) even if every caller drops its future.
///
/// # Example
/// ```rust
/// use corral::{Dedupe, DedupeConfig};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let lookup: Dedupe<u32, String, String> =
///         Dedupe::new(DedupeConfig::default(), |id: u32| async move { Ok(format!("user-{id}")) });
///
///     let (a, b) = tokio::join!(lookup.call(7), lookup.call(7));
///     assert_eq!(a.unwrap(), b.unwrap());
/// }
/// ```
pub struct Dedupe<A, T, E> {
    inner: Arc<Inner<A, T, E>>,
}

impl<A, T, E> Clone for Dedupe<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T, E> Dedupe<A, T, E>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wraps `f`, keying calls by the JSON form of their arguments.
    pub fn new<F, Fut>(cfg: DedupeConfig, f: F) -> Self
    where
        A: Serialize,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        DedupeBuilder::new(cfg).build(f)
    }

    /// Wraps `f`, handing it the invocation's cancellation token.
    ///
    /// The token is cancelled by [`abort`](Self::abort), [`abort_all`](Self::abort_all),
    /// [`reset`](Self::reset) and the staleness sweep.
    pub fn with_cancellation<F, Fut>(cfg: DedupeConfig, f: F) -> Self
    where
        A: Serialize,
        F: Fn(A, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        DedupeBuilder::new(cfg).build_with_cancellation(f)
    }

    fn from_parts(cfg: DedupeConfig, key: KeyFn<A>, call: CallFn<A, T, E>) -> Self {
        Self {
            inner: Arc::new(Inner {
                call,
                key,
                cfg,
                state: Mutex::new(State {
                    records: HashMap::new(),
                    next_generation: 0,
                    sweeper: None,
                }),
            }),
        }
    }

    /// Coalescing key for `args`, prefix included.
    pub fn key_for(&self, args: &A) -> Result<String, DedupeError<E>> {
        let key = (self.inner.key)(args).map_err(|reason| DedupeError::Key { reason })?;
        Ok(namespaced(self.inner.cfg.prefix.as_deref(), key))
    }

    /// Calls the wrapped function, or joins the in-flight invocation for the same key.
    ///
    /// Registration happens before this returns: a call made after `call()` returns,
    /// but before the first invocation settles, always joins it.
    pub fn call(
        &self,
        args: A,
    ) -> impl Future<Output = Result<T, DedupeError<E>>> + Send + use<A, T, E> {
        let joined = self.join(args);
        let isolate = !self.inner.cfg.error_sharing;

        async move {
            match joined?.await {
                Err(DedupeError::Operation(err)) if isolate => {
                    Err(DedupeError::Operation(Arc::new(E::clone(&err))))
                }
                outcome => outcome,
            }
        }
    }

    fn join(&self, args: A) -> Result<SharedCall<T, E>, DedupeError<E>> {
        let key = self.key_for(&args)?;
        let joined = self.subscribe(&mut self.inner.state.lock(), &key);
        if let Some(call) = joined {
            return Ok(call);
        }

        // Invoked outside the lock; a synchronous panic leaves nothing registered.
        let token = CancellationToken::new();
        let handed = token.clone();
        let invoke = AssertUnwindSafe(|| (self.inner.call)(args, handed));
        let fut = std::panic::catch_unwind(invoke).map_err(|payload| {
            tracing::debug!(key = %key, "wrapped call panicked before starting");
            DedupeError::Panicked {
                message: panic_message(payload.as_ref()),
            }
        })?;

        let call = {
            let mut st = self.inner.state.lock();
            if let Some(call) = self.subscribe(&mut st, &key) {
                // Lost a registration race; the unpolled future is dropped.
                return Ok(call);
            }

            let generation = st.next_generation;
            st.next_generation += 1;
            let call = self.start(key.clone(), fut, token.clone(), generation);
            st.records.insert(
                key.clone(),
                Record {
                    call: call.clone(),
                    created_at: Instant::now(),
                    subscribers: 1,
                    token,
                    generation,
                },
            );
            self.ensure_sweeper(&mut st);
            call
        };

        tracing::debug!(key = %key, "started call");
        tokio::spawn(call.clone());
        Ok(call)
    }

    /// Joins the record under `key` if it still accepts subscribers.
    fn subscribe(&self, st: &mut State<T, E>, key: &str) -> Option<SharedCall<T, E>> {
        let now = Instant::now();
        let rec = st.records.get_mut(key)?;
        if rec.accepts_subscribers(now, self.inner.cfg.stale_after(), self.inner.cfg.join_timeout()) {
            rec.subscribers += 1;
            tracing::trace!(key = %key, subscribers = rec.subscribers, "joined in-flight call");
            return Some(rec.call.clone());
        }
        // The superseded invocation keeps running for its own subscribers.
        tracing::debug!(key = %key, age = ?rec.age(now), "superseding stale in-flight call");
        None
    }

    fn start(
        &self,
        key: String,
        fut: BoxFuture<'static, Result<T, E>>,
        token: CancellationToken,
        generation: u64,
    ) -> SharedCall<T, E> {
        let inner = Arc::downgrade(&self.inner);

        async move {
            let run = AssertUnwindSafe(fut).catch_unwind();
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(DedupeError::Aborted { key: key.clone() }),
                res = run => match res {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(DedupeError::Operation(Arc::new(err))),
                    Err(payload) => Err(DedupeError::Panicked {
                        message: panic_message(payload.as_ref()),
                    }),
                },
            };

            if let Some(inner) = inner.upgrade() {
                inner.settle(&key, generation);
            }
            outcome
        }
        .boxed()
        .shared()
    }

    fn ensure_sweeper(&self, st: &mut State<T, E>) {
        let Some(max_age) = self.inner.cfg.stale_after() else {
            return;
        };
        if st.sweeper.is_some() {
            return;
        }

        let inner = Arc::downgrade(&self.inner);
        st.sweeper = Some(spawn_sweeper(sweep_period(max_age), move || {
            inner.upgrade().is_some_and(|inner| inner.sweep(max_age))
        }));
    }

    /// True if an invocation is in flight under `key` (prefix included).
    pub fn is_in_progress(&self, key: &str) -> bool {
        self.inner.state.lock().records.contains_key(key)
    }

    /// Number of in-flight invocations.
    pub fn in_progress_count(&self) -> usize {
        self.inner.state.lock().records.len()
    }

    /// Keys of in-flight invocations, sorted.
    pub fn in_progress_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.inner.state.lock().records.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of calls attached to the in-flight invocation under `key`.
    pub fn subscriber_count(&self, key: &str) -> Option<usize> {
        self.inner.state.lock().records.get(key).map(|r| r.subscribers)
    }

    /// Aborts the invocation under `key`. Its subscribers settle with
    /// [`DedupeError::Aborted`]. Returns whether a record existed.
    pub fn abort(&self, key: &str) -> bool {
        let removed = self.inner.state.lock().records.remove(key);
        match removed {
            Some(rec) => {
                tracing::debug!(key = %key, "aborted in-flight call");
                rec.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Aborts every in-flight invocation. Returns how many there were.
    pub fn abort_all(&self) -> usize {
        let records: Vec<_> = self.inner.state.lock().records.drain().collect();
        for (_, rec) in &records {
            rec.token.cancel();
        }
        if !records.is_empty() {
            tracing::debug!(count = records.len(), "aborted all in-flight calls");
        }
        records.len()
    }

    /// Aborts everything and stops the staleness sweep.
    pub fn reset(&self) {
        let sweeper = self.inner.state.lock().sweeper.take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        self.abort_all();
    }
}

/// Builder for [`Dedupe`] with a custom key function.
pub struct DedupeBuilder<A> {
    cfg: DedupeConfig,
    key: KeyFn<A>,
}

impl<A> DedupeBuilder<A>
where
    A: Serialize + 'static,
{
    /// Keys calls by the compact JSON form of their arguments.
    pub fn new(cfg: DedupeConfig) -> Self {
        Self {
            cfg,
            key: json_key(),
        }
    }
}

impl<A> DedupeBuilder<A>
where
    A: 'static,
{
    /// Keys calls with `key` instead of JSON; `A` need not be serializable.
    pub fn keyed<K>(cfg: DedupeConfig, key: K) -> Self
    where
        K: Fn(&A) -> String + Send + Sync + 'static,
    {
        Self {
            cfg,
            key: custom_key(key),
        }
    }

    /// Wraps `f`.
    pub fn build<T, E, F, Fut>(self, f: F) -> Dedupe<A, T, E>
    where
        A: Send,
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Dedupe::from_parts(self.cfg, self.key, Arc::new(move |args, _| f(args).boxed()))
    }

    /// Wraps `f`, handing it each invocation's cancellation token.
    pub fn build_with_cancellation<T, E, F, Fut>(self, f: F) -> Dedupe<A, T, E>
    where
        A: Send,
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: Fn(A, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Dedupe::from_parts(
            self.cfg,
            self.key,
            Arc::new(move |args, token| f(args, token).boxed()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedupe::ErrorSnapshot;
    use futures::future::join_all;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn counting(
        calls: Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl Fn(u32) -> BoxFuture<'static, Result<String, String>> + Send + Sync + 'static {
        move |id| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(delay).await;
                Ok(format!("user-{id}"))
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_one_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dedupe = Dedupe::new(
            DedupeConfig::default(),
            counting(calls.clone(), Duration::from_millis(20)),
        );

        let results = join_all((0..5).map(|_| dedupe.call(7))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for res in results {
            assert_eq!(res.ok().as_deref(), Some("user-7"));
        }
        assert!(!dedupe.is_in_progress("7"));

        // Settled keys start over.
        assert!(dedupe.call(7).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_is_visible_before_first_poll() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dedupe = Dedupe::new(
            DedupeConfig::default(),
            counting(calls.clone(), Duration::from_millis(20)),
        );

        let a = dedupe.call(1);
        let b = dedupe.call(1);
        let c = dedupe.call(2);

        assert_eq!(dedupe.subscriber_count("1"), Some(2));
        assert_eq!(dedupe.subscriber_count("2"), Some(1));
        assert_eq!(dedupe.in_progress_count(), 2);
        assert_eq!(dedupe.in_progress_keys(), vec!["1".to_string(), "2".to_string()]);

        let (a, b, c) = tokio::join!(a, b, c);
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(dedupe.in_progress_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_sharing_controls_identity() {
        let failing = |_: u32| async {
            sleep(Duration::from_millis(5)).await;
            Err::<u32, _>(ErrorSnapshot::new("RangeError", "out of range").with_property("max", 3))
        };

        let shared = Dedupe::new(DedupeConfig::default(), failing);
        let (a, b) = tokio::join!(shared.call(1), shared.call(1));
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert!(Arc::ptr_eq(a.operation().unwrap(), b.operation().unwrap()));

        let isolated = Dedupe::new(
            DedupeConfig {
                error_sharing: false,
                ..DedupeConfig::default()
            },
            failing,
        );
        let (a, b) = tokio::join!(isolated.call(1), isolated.call(1));
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        let (a, b) = (a.operation().unwrap(), b.operation().unwrap());
        assert!(!Arc::ptr_eq(a, b));
        assert_eq!(a, b);
        assert_eq!(a.kind(), "RangeError");
        assert_eq!(b.property("max"), Some(&serde_json::json!(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_finisher_keeps_newer_record() {
        let dedupe: Dedupe<(u32, u64), u32, String> = DedupeBuilder::keyed(
            DedupeConfig {
                timeout: Duration::from_millis(10),
                ..DedupeConfig::default()
            },
            |_: &(u32, u64)| "k".to_string(),
        )
        .build(|(id, ms): (u32, u64)| async move {
            sleep(Duration::from_millis(ms)).await;
            Ok(id)
        });

        let first = dedupe.call((1, 50));
        sleep(Duration::from_millis(20)).await;
        let second = dedupe.call((2, 100));
        assert_eq!(dedupe.subscriber_count("k"), Some(1));

        assert_eq!(first.await.ok(), Some(1));
        assert!(dedupe.is_in_progress("k"), "old generation must not remove the new record");

        assert_eq!(second.await.ok(), Some(2));
        assert!(!dedupe.is_in_progress("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels_injected_token() {
        let seen = Arc::new(Mutex::new(None::<CancellationToken>));
        let slot = seen.clone();
        let dedupe: Dedupe<u32, u32, String> = Dedupe::with_cancellation(
            DedupeConfig::default(),
            move |id: u32, token: CancellationToken| {
                *slot.lock() = Some(token);
                async move {
                    sleep(Duration::from_secs(1)).await;
                    Ok(id)
                }
            },
        );

        let pending = dedupe.call(1);
        tokio::task::yield_now().await;

        assert!(dedupe.abort("1"));
        assert!(!dedupe.abort("1"));
        match pending.await {
            Err(DedupeError::Aborted { key }) => assert_eq!(key, "1"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let token = seen.lock().take().expect("function was invoked");
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_all_and_reset() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dedupe = Dedupe::new(
            DedupeConfig {
                max_age: Duration::from_secs(10),
                ..DedupeConfig::default()
            },
            counting(calls, Duration::from_secs(1)),
        );

        let a = dedupe.call(1);
        let b = dedupe.call(2);
        assert_eq!(dedupe.abort_all(), 2);
        assert!(matches!(a.await, Err(DedupeError::Aborted { .. })));
        assert!(matches!(b.await, Err(DedupeError::Aborted { .. })));

        let c = dedupe.call(3);
        assert!(dedupe.inner.state.lock().sweeper.is_some());
        dedupe.reset();
        assert!(matches!(c.await, Err(DedupeError::Aborted { .. })));
        assert!(dedupe.inner.state.lock().sweeper.is_none());
        assert_eq!(dedupe.in_progress_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_aborts_stale_records_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dedupe = Dedupe::new(
            DedupeConfig {
                max_age: Duration::from_millis(30),
                ..DedupeConfig::default()
            },
            counting(calls, Duration::from_secs(5)),
        );

        let started = Instant::now();
        let res = dedupe.call(1).await;
        assert!(matches!(res, Err(DedupeError::Aborted { .. })));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(dedupe.in_progress_count(), 0);
        assert!(dedupe.inner.state.lock().sweeper.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_when_idle_and_restarts_lazily() {
        let dedupe: Dedupe<u64, u64, String> = Dedupe::new(
            DedupeConfig {
                max_age: Duration::from_millis(30),
                ..DedupeConfig::default()
            },
            |ms: u64| async move {
                sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            },
        );

        assert_eq!(dedupe.call(10).await.ok(), Some(10));
        assert_eq!(dedupe.in_progress_count(), 0);
        assert!(dedupe.inner.state.lock().sweeper.is_some());

        sleep(Duration::from_millis(40)).await;
        assert!(
            dedupe.inner.state.lock().sweeper.is_none(),
            "sweeper stops after a tick over an empty map"
        );

        let started = Instant::now();
        let stale = dedupe.call(5_000);
        assert!(dedupe.inner.state.lock().sweeper.is_some());
        assert!(matches!(stale.await, Err(DedupeError::Aborted { .. })));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(dedupe.inner.state.lock().sweeper.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_synchronous_panic_registers_nothing() {
        let dedupe: Dedupe<u32, u32, String> = Dedupe::new(DedupeConfig::default(), |id: u32| {
            if id == 0 {
                panic!("rejected before starting");
            }
            async move { Ok(id) }
        });

        let failed = dedupe.call(0);
        assert_eq!(dedupe.in_progress_count(), 0);
        match failed.await {
            Err(DedupeError::Panicked { message }) => {
                assert_eq!(message, "rejected before starting")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(dedupe.call(3).await.ok(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_failure_registers_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let dedupe: Dedupe<BTreeMap<Vec<u8>, u8>, u8, String> =
            Dedupe::new(DedupeConfig::default(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            });

        let mut args = BTreeMap::new();
        args.insert(vec![1u8], 1u8);
        assert!(matches!(dedupe.call(args).await, Err(DedupeError::Key { .. })));
        assert_eq!(dedupe.in_progress_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefix_and_panics() {
        let dedupe: Dedupe<u32, u32, String> = Dedupe::new(
            DedupeConfig {
                prefix: Some("users".into()),
                ..DedupeConfig::default()
            },
            |id: u32| async move {
                sleep(Duration::from_millis(5)).await;
                if id == 0 {
                    panic!("zero id");
                }
                Ok(id)
            },
        );

        let pending = dedupe.call(0);
        assert_eq!(dedupe.in_progress_keys(), vec!["users:0".to_string()]);
        assert_eq!(dedupe.key_for(&0).ok().as_deref(), Some("users:0"));

        match pending.await {
            Err(DedupeError::Panicked { message }) => assert_eq!(message, "zero id"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!dedupe.is_in_progress("users:0"));
        assert_eq!(dedupe.call(4).await.ok(), Some(4));
    }
}
