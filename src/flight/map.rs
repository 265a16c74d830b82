//! # Single-flight map: compute each key at most once, fan the result out.
//!
//! Every requester of a key ends up on one of three paths, decided by a single
//! engine message so that "check state, then start or attach" cannot race:
//!
//! ```text
//! get_value(k) ──► engine ─┬─ Done(v)        → v
//!                          ├─ Failed(r)      → FlightError::Failed(r)
//!                          ├─ Calculating    → attach a listener, wait
//!                          └─ absent         → insert Calculating, spawn compute, wait
//!
//! compute task ──► engine: mark Done/Failed, take listeners, send to each
//! ```
//!
//! Completion is also one engine message: it stores the final state and takes
//! the listener list in the same step, so a requester either joined that list
//! before completion (and is notified) or arrives after it (and reads the
//! stored result). Nobody is notified twice and nobody is missed.
//!
//! A panicking `compute` moves the entry to a permanent failed state; current and
//! future requesters of that key observe [`FlightError::Failed`]. There is no retry.
//!
//! ## Example
//! ```rust
//! use coact::{Config, Context, SingleFlight};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), coact::FlightError> {
//!     let ctx = Context::new(Config::default());
//!     let squares: SingleFlight<u32, u64> = SingleFlight::new(&ctx, "squares");
//!
//!     let v = squares.get_value(12, |k| async move { u64::from(k) * u64::from(k) }).await?;
//!     assert_eq!(v, 144);
//!
//!     squares.launch(3, |k| async move { u64::from(k).pow(2) }, |v| async move {
//!         println!("3² = {v}");
//!     });
//!     let mut all = squares.all().await?;
//!     all.sort();
//!     assert_eq!(all, vec![9, 144]);
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::oneshot;

use crate::core::{Capacity, Context, Engine, TaskHandle};
use crate::error::{EngineError, FlightError, panic_reason};
use crate::events::{Event, EventKind};
use crate::join::JoinSet;

type Listener<V> = oneshot::Sender<Result<V, FlightError>>;

enum Entry<V> {
    Calculating(Vec<Listener<V>>),
    Done(V),
    Failed(String),
}

/// A requester's view of an entry.
enum Pending<V> {
    Ready(Result<V, FlightError>),
    Waiting(oneshot::Receiver<Result<V, FlightError>>),
}

impl<V> Pending<V> {
    async fn resolve(self) -> Result<V, FlightError> {
        match self {
            Pending::Ready(res) => res,
            Pending::Waiting(rx) => rx.await.map_err(|_| EngineError::Closed)?,
        }
    }
}

struct FlightState<K, V> {
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> FlightState<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Start-or-attach; the caller always ends up with a result or a listener.
    fn attach<F, Fut>(&mut self, key: K, compute: F, map: &SingleFlight<K, V>) -> Pending<V>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = V> + Send + 'static,
    {
        match self.entries.get_mut(&key) {
            Some(Entry::Done(v)) => Pending::Ready(Ok(v.clone())),
            Some(Entry::Failed(reason)) => Pending::Ready(Err(FlightError::Failed {
                reason: reason.clone(),
            })),
            Some(Entry::Calculating(listeners)) => {
                let (tx, rx) = oneshot::channel();
                listeners.push(tx);
                Pending::Waiting(rx)
            }
            None => self.start(key, compute, map),
        }
    }

    /// Starts only if the key is unknown; `None` when it is calculating or settled.
    fn attach_if_absent<F, Fut>(
        &mut self,
        key: K,
        compute: F,
        map: &SingleFlight<K, V>,
    ) -> Option<Pending<V>>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = V> + Send + 'static,
    {
        if self.entries.contains_key(&key) {
            return None;
        }
        Some(self.start(key, compute, map))
    }

    fn start<F, Fut>(&mut self, key: K, compute: F, map: &SingleFlight<K, V>) -> Pending<V>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(key.clone(), Entry::Calculating(vec![tx]));
        map.spawn_compute(key, compute);
        Pending::Waiting(rx)
    }

    /// Settles an entry and notifies the listeners collected so far.
    fn complete(&mut self, key: K, outcome: Result<V, String>) {
        let settled = match &outcome {
            Ok(v) => Entry::Done(v.clone()),
            Err(reason) => Entry::Failed(reason.clone()),
        };
        let Some(Entry::Calculating(listeners)) = self.entries.insert(key, settled) else {
            return;
        };
        for listener in listeners {
            let msg = match &outcome {
                Ok(v) => Ok(v.clone()),
                Err(reason) => Err(FlightError::Failed {
                    reason: reason.clone(),
                }),
            };
            let _ = listener.send(msg);
        }
    }

    fn done_values(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().filter_map(|(k, e)| match e {
            Entry::Done(v) => Some((k, v)),
            _ => None,
        })
    }
}

/// Keyed cache of in-flight and completed computations.
pub struct SingleFlight<K, V> {
    name: Arc<str>,
    engine: Engine<FlightState<K, V>>,
    jobs: JoinSet,
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            engine: self.engine.clone(),
            jobs: self.jobs.clone(),
        }
    }
}

impl<K, V> std::fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("name", &self.name)
            .finish()
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty map with a rendezvous mailbox.
    pub fn new(ctx: &Context, name: impl Into<Arc<str>>) -> Self {
        let name: Arc<str> = name.into();
        let engine = Engine::with_capacity(
            ctx,
            format!("{name} -> single flight"),
            Capacity::Rendezvous,
            FlightState {
                entries: HashMap::new(),
            },
        );
        let jobs = JoinSet::new(ctx, format!("{name} -> launches"));
        Self { name, engine, jobs }
    }

    /// Map name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value for `key`, running `compute` only if no one has started it.
    ///
    /// Concurrent callers for the same key share one computation and all observe
    /// the same value. `compute` of a caller that attached to a running
    /// computation, or hit a settled entry, is dropped without being called.
    pub async fn get_value<F, Fut>(&self, key: K, compute: F) -> Result<V, FlightError>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = V> + Send + 'static,
    {
        let me = self.clone();
        let pending = self
            .engine
            .ask_with(move |state| state.attach(key, compute, &me))
            .await?;
        pending.resolve().await
    }

    /// Fire-and-forget [`get_value`](Self::get_value) followed by `after(value)`.
    ///
    /// The returned handle is also registered with this map's join set, so
    /// [`join`](Self::join) and [`all`](Self::all) wait for it.
    pub fn launch<F, Fut, A, AFut>(&self, key: K, compute: F, after: A) -> TaskHandle
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = V> + Send + 'static,
        A: FnOnce(V) -> AFut + Send + 'static,
        AFut: Future<Output = ()> + Send + 'static,
    {
        let me = self.clone();
        self.track("launch", async move {
            match me.get_value(key, compute).await {
                Ok(v) => after(v).await,
                Err(e) => me.report_lost(&e),
            }
        })
    }

    /// Like [`launch`](Self::launch), but only if `key` was absent when the
    /// check ran inside the engine.
    ///
    /// If the key is already calculating or settled, neither `compute` nor `after`
    /// is invoked by this call.
    pub fn launch_on_absence<F, Fut, A, AFut>(&self, key: K, compute: F, after: A) -> TaskHandle
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = V> + Send + 'static,
        A: FnOnce(V) -> AFut + Send + 'static,
        AFut: Future<Output = ()> + Send + 'static,
    {
        let me = self.clone();
        self.track("launch on absence", async move {
            let inner = me.clone();
            let started = me
                .engine
                .ask_with(move |state| state.attach_if_absent(key, compute, &inner))
                .await;
            match started {
                Ok(Some(pending)) => match pending.resolve().await {
                    Ok(v) => after(v).await,
                    Err(e) => me.report_lost(&e),
                },
                Ok(None) => tracing::trace!(map = %me.name, "key present, launch skipped"),
                Err(e) => me.report_lost(&FlightError::from(e)),
            }
        })
    }

    /// Waits for every launched task, including ones launched meanwhile.
    pub async fn join(&self) -> Result<(), EngineError> {
        self.jobs.join().await
    }

    /// True when no launched task is outstanding.
    pub async fn is_empty(&self) -> Result<bool, EngineError> {
        self.jobs.is_empty().await
    }

    /// Joins, then returns every computed value (unordered).
    pub async fn all(&self) -> Result<Vec<V>, EngineError> {
        self.join().await?;
        self.engine
            .ask_with(|state| state.done_values().map(|(_, v)| v.clone()).collect())
            .await
    }

    /// Joins, then returns a snapshot of every computed key/value pair.
    pub async fn as_map(&self) -> Result<HashMap<K, V>, EngineError> {
        self.join().await?;
        self.engine
            .ask_with(|state| {
                state
                    .done_values()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .await
    }

    /// True if `key` is calculating or settled.
    pub async fn contains_key(&self, key: K) -> Result<bool, EngineError> {
        self.engine
            .ask_with(move |state| state.entries.contains_key(&key))
            .await
    }

    /// Number of known keys, calculating ones included.
    pub async fn len(&self) -> Result<usize, EngineError> {
        self.engine.ask_with(|state| state.entries.len()).await
    }

    /// Stops the map and its join set; waiting requesters fail with [`EngineError::Closed`].
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.engine.request_stop().await?;
        self.jobs.stop().await
    }

    fn spawn_compute<F, Fut>(&self, key: K, compute: F)
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = V> + Send + 'static,
    {
        let me = self.clone();
        let task = format!("{} -> compute", self.name);
        self.engine.context().spawn(&task, async move {
            let arg = key.clone();
            let outcome = AssertUnwindSafe(async move { compute(arg).await })
                .catch_unwind()
                .await
                .map_err(|p| panic_reason(&*p));

            if let Err(reason) = &outcome {
                tracing::warn!(map = %me.name, %reason, "computation panicked");
                me.engine.context().publish(
                    Event::new(EventKind::ComputeFailed)
                        .with_owner(Arc::clone(&me.name))
                        .with_reason(reason.as_str()),
                );
            }
            if let Err(e) = me
                .engine
                .tell_with(move |state| state.complete(key, outcome))
                .await
            {
                tracing::debug!(map = %me.name, error = %e, "result dropped, map stopped");
            }
        });
    }

    fn track<Fut>(&self, what: &str, fut: Fut) -> TaskHandle
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self
            .engine
            .context()
            .spawn_tracked(&format!("{} -> {what}", self.name), fut);
        if let Err(e) = self.jobs.offer(handle.clone()) {
            tracing::debug!(map = %self.name, error = %e, "launch not tracked");
        }
        handle
    }

    fn report_lost(&self, err: &FlightError) {
        tracing::warn!(map = %self.name, error = err.as_label(), detail = %err.as_message(), "launch got no value");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ctx() -> Context {
        Context::new(Config::default())
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_compute_once() {
        let map: SingleFlight<u32, u32> = SingleFlight::new(&ctx(), "once");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut requests = Vec::new();
        for _ in 0..10 {
            let map = map.clone();
            let calls = Arc::clone(&calls);
            requests.push(tokio::spawn(async move {
                map.get_value(5, move |k| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    k + 6
                })
                .await
            }));
        }
        for r in requests {
            assert_eq!(r.await.expect("join"), Ok(11));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let cached = map.get_value(5, |k| async move { k }).await;
        assert_eq!(cached, Ok(11), "settled value is served, compute is not rerun");
        assert_eq!(map.len().await, Ok(1));
        assert_eq!(map.contains_key(5).await, Ok(true));
    }

    #[tokio::test(start_paused = true)]
    async fn launch_on_absence_runs_after_for_the_starter_only() {
        let map: SingleFlight<u32, u32> = SingleFlight::new(&ctx(), "absence");
        let computed = Arc::new(AtomicUsize::new(0));
        let afters = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let computed = Arc::clone(&computed);
            let afters = Arc::clone(&afters);
            map.launch_on_absence(
                5,
                move |k| async move {
                    computed.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    k + 6
                },
                move |_| async move {
                    afters.fetch_add(1, Ordering::SeqCst);
                },
            );
        }
        map.join().await.expect("join");

        assert_eq!(computed.load(Ordering::SeqCst), 1);
        assert_eq!(afters.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_keys_compute_once_per_key() {
        let map: SingleFlight<u32, u32> = SingleFlight::new(&ctx(), "mixed");
        let fives = Arc::new(AtomicUsize::new(0));
        let sixes = Arc::new(AtomicUsize::new(0));

        let mut requests = Vec::new();
        for key in [5, 5, 6, 5] {
            let map = map.clone();
            let counter = Arc::clone(if key == 5 { &fives } else { &sixes });
            requests.push(tokio::spawn(async move {
                map.get_value(key, move |k| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    k + 6
                })
                .await
            }));
        }
        let mut results = Vec::new();
        for r in requests {
            results.push(r.await.expect("join").expect("value"));
        }

        assert_eq!(results, vec![11, 11, 12, 11]);
        assert_eq!(fives.load(Ordering::SeqCst), 1);
        assert_eq!(sixes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn launch_on_absence_skips_settled_keys() {
        let map: SingleFlight<u32, u32> = SingleFlight::new(&ctx(), "settled");
        assert_eq!(map.get_value(5, |k| async move { k + 6 }).await, Ok(11));

        let computed = Arc::new(AtomicUsize::new(0));
        let afters = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&computed);
        let a = Arc::clone(&afters);
        map.launch_on_absence(
            5,
            move |k| async move {
                c.fetch_add(1, Ordering::SeqCst);
                k
            },
            move |_| async move {
                a.fetch_add(1, Ordering::SeqCst);
            },
        )
        .finished()
        .await;
        map.join().await.expect("join");

        assert_eq!(computed.load(Ordering::SeqCst), 0);
        assert_eq!(afters.load(Ordering::SeqCst), 0);
        assert_eq!(map.get_value(5, |k| async move { k }).await, Ok(11));
    }

    #[tokio::test(start_paused = true)]
    async fn launch_calls_after_for_cached_values_too() {
        let map: SingleFlight<&'static str, usize> = SingleFlight::new(&ctx(), "after");
        let seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            map.launch("word", |k| async move { k.len() }, move |v| async move {
                seen.fetch_add(v, Ordering::SeqCst);
            });
        }
        assert_eq!(map.all().await, Ok(vec![4]));
        assert_eq!(seen.load(Ordering::SeqCst), 12);
        assert_eq!(map.is_empty().await, Ok(true));
    }

    #[tokio::test(start_paused = true)]
    async fn all_waits_for_nested_launches() {
        let map: SingleFlight<u32, String> = SingleFlight::new(&ctx(), "nested");
        let inner = map.clone();
        map.launch(
            5,
            move |k| async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                inner.launch(6, |k| async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    format!("World{k}")
                }, |_| async {});
                format!("World{k}")
            },
            |_| async {},
        );

        let all = map.as_map().await.expect("as_map");
        assert_eq!(all.len(), 2);
        assert_eq!(all.get(&5).map(String::as_str), Some("World5"));
        assert_eq!(all.get(&6).map(String::as_str), Some("World6"));
    }

    #[tokio::test]
    async fn panicking_compute_fails_every_requester() {
        let ctx = ctx();
        let mut events = ctx.bus().subscribe();
        let map: SingleFlight<u32, u32> = SingleFlight::new(&ctx, "failing");

        let first = map
            .get_value(1, |k| async move {
                if k == 1 {
                    panic!("no value for you");
                }
                k
            })
            .await;
        assert_eq!(
            first,
            Err(FlightError::Failed {
                reason: "no value for you".into()
            })
        );

        let later = map.get_value(1, |k| async move { k }).await;
        assert!(matches!(later, Err(FlightError::Failed { .. })));
        assert_eq!(map.get_value(2, |k| async move { k * 2 }).await, Ok(4));

        let ev = events.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::ComputeFailed);
        assert_eq!(ev.owner.as_deref(), Some("failing"));
    }

    #[tokio::test]
    async fn stopped_map_refuses_requests() {
        let map: SingleFlight<u32, u32> = SingleFlight::new(&ctx(), "stopped");
        map.stop().await.expect("stop");
        map.engine.stopped().await;
        assert_eq!(
            map.get_value(1, |k| async move { k }).await,
            Err(FlightError::Engine(EngineError::Closed))
        );
    }
}
