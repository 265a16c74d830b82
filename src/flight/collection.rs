//! # Grouped single-flight maps.
//!
//! [`FlightCollection`] keeps one [`SingleFlight`] map per group and creates a
//! group's map atomically on first use. [`FlightWriter`] is the write side for
//! callers that must not wait: every insert becomes a tracked background task,
//! and [`FlightWriter::join`] waits for those tasks *and* the launches they made.
//!
//! ```text
//! writer.insert(g, k, ..) ──► tracked task ──► collection.insert(g, k, ..)
//!                                                  │  (engine: get or create map g)
//!                                                  └─► map_g.launch(k, ..) ──► handle
//!                                              writer registers handle
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use crate::core::{Capacity, Context, Engine, TaskHandle};
use crate::error::EngineError;
use crate::flight::SingleFlight;
use crate::join::JoinSet;

/// Single-flight maps keyed by group.
pub struct FlightCollection<G, K, V> {
    name: Arc<str>,
    engine: Engine<HashMap<G, SingleFlight<K, V>>>,
}

impl<G, K, V> Clone for FlightCollection<G, K, V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            engine: self.engine.clone(),
        }
    }
}

impl<G, K, V> FlightCollection<G, K, V>
where
    G: Eq + Hash + Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty collection.
    pub fn new(ctx: &Context, name: impl Into<Arc<str>>) -> Self {
        let name: Arc<str> = name.into();
        let engine = Engine::with_capacity(
            ctx,
            format!("{name} -> collection"),
            Capacity::Rendezvous,
            HashMap::new(),
        );
        Self { name, engine }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Launches `compute` for `key` in the map of `group`, creating that map if needed.
    ///
    /// See [`SingleFlight::launch`]; `after` runs once the value is available.
    pub async fn insert<F, Fut, A, AFut>(
        &self,
        group: G,
        key: K,
        compute: F,
        after: A,
    ) -> Result<TaskHandle, EngineError>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = V> + Send + 'static,
        A: FnOnce(V) -> AFut + Send + 'static,
        AFut: Future<Output = ()> + Send + 'static,
    {
        let ctx = self.engine.context().clone();
        let name = Arc::clone(&self.name);
        let map = self
            .engine
            .ask_with(move |groups| {
                let next = groups.len();
                groups
                    .entry(group)
                    .or_insert_with(|| {
                        tracing::trace!(collection = %name, group = next, "new group map");
                        SingleFlight::new(&ctx, format!("{name}[{next}]"))
                    })
                    .clone()
            })
            .await?;
        Ok(map.launch(key, compute, after))
    }

    /// Waits until no group map has outstanding launches.
    ///
    /// Launches can add launches to other groups; the check repeats until a full
    /// pass finds every map drained.
    pub async fn join(&self) -> Result<(), EngineError> {
        loop {
            let mut drained = true;
            for map in self.all().await? {
                if !map.is_empty().await? {
                    drained = false;
                    map.join().await?;
                }
            }
            if drained {
                return Ok(());
            }
        }
    }

    /// Every group map (unordered).
    pub async fn all(&self) -> Result<Vec<SingleFlight<K, V>>, EngineError> {
        self.engine
            .ask_with(|groups| groups.values().cloned().collect())
            .await
    }

    /// Snapshot of the group → map association.
    pub async fn as_map(&self) -> Result<HashMap<G, SingleFlight<K, V>>, EngineError> {
        self.engine.ask_with(|groups| groups.clone()).await
    }
}

/// Non-waiting write side of a [`FlightCollection`].
pub struct FlightWriter<G, K, V> {
    name: Arc<str>,
    cache: FlightCollection<G, K, V>,
    jobs: JoinSet,
}

impl<G, K, V> FlightWriter<G, K, V>
where
    G: Eq + Hash + Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a writer feeding `cache`.
    pub fn new(name: impl Into<Arc<str>>, cache: FlightCollection<G, K, V>) -> Self {
        let name: Arc<str> = name.into();
        let jobs = JoinSet::new(cache.engine.context(), format!("{name} -> writes"));
        Self { name, cache, jobs }
    }

    /// Collection written to.
    pub fn cache(&self) -> &FlightCollection<G, K, V> {
        &self.cache
    }

    /// Queues an insert without waiting for the collection.
    pub fn insert<F, Fut, A, AFut>(&self, group: G, key: K, compute: F, after: A)
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = V> + Send + 'static,
        A: FnOnce(V) -> AFut + Send + 'static,
        AFut: Future<Output = ()> + Send + 'static,
    {
        let cache = self.cache.clone();
        let jobs = self.jobs.clone();
        let name = Arc::clone(&self.name);
        self.launch("insert", async move {
            match cache.insert(group, key, compute, after).await {
                Ok(launched) => {
                    if let Err(e) = jobs.register(launched).await {
                        tracing::debug!(writer = %name, error = %e, "launch not tracked");
                    }
                }
                Err(e) => tracing::warn!(writer = %name, error = %e, "insert refused"),
            }
        });
    }

    /// Runs `fut` as a tracked task of this writer.
    pub fn launch<Fut>(&self, what: &str, fut: Fut) -> TaskHandle
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self
            .cache
            .engine
            .context()
            .spawn_tracked(&format!("{} -> {what}", self.name), fut);
        if let Err(e) = self.jobs.offer(handle.clone()) {
            tracing::debug!(writer = %self.name, error = %e, "task not tracked");
        }
        handle
    }

    /// Waits for every insert and launch of this writer, including their follow-ups.
    pub async fn join(&self) -> Result<(), EngineError> {
        self.jobs.join().await
    }
}
