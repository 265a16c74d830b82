//! # Join set: wait for an open-ended set of background tasks.
//!
//! Tasks are registered over time as [`TaskHandle`]s. [`JoinSet::join`] returns
//! only once the set has fully drained, including handles registered *while* the
//! join is waiting, typically by the very tasks being waited on.
//!
//! ## Join rounds
//! ```text
//! join() ──► engine: round active?  ── yes ──► attach gate
//!                     set empty?     ── yes ──► open gate now
//!                     otherwise      ────────► snapshot + clear set, attach gate,
//!                                              spawn driver
//!
//! driver (outside the mailbox):
//!   loop {
//!       await every handle of the snapshot
//!       engine: new handles?  ── yes ──► snapshot = take(set); continue
//!                             ── no  ──► open all gates, end round; break
//!   }
//! ```
//!
//! At most one round is active per set; every concurrent `join` attaches to it.
//! A task that panicked still counts as finished: join never reports task
//! failures. A producer that keeps registering new work keeps `join` waiting.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::core::{Capacity, Context, Engine, TaskHandle};
use crate::error::EngineError;
use crate::events::{Event, EventKind};

struct Tracker {
    tracked: Vec<TaskHandle>,
    /// `Some` while a round is active: the gates of every attached `join`.
    round: Option<Vec<oneshot::Sender<()>>>,
}

impl Tracker {
    fn attach(&mut self, gate: oneshot::Sender<()>, set: &JoinSet) {
        if let Some(gates) = self.round.as_mut() {
            gates.push(gate);
            return;
        }
        self.tracked.retain(|h| !h.is_finished());
        if self.tracked.is_empty() {
            let _ = gate.send(());
            return;
        }

        let snapshot = std::mem::take(&mut self.tracked);
        self.round = Some(vec![gate]);
        set.publish(EventKind::JoinRoundStarted, snapshot.len());
        tracing::trace!(join_set = %set.name(), tasks = snapshot.len(), "join round started");

        let driver = set.clone();
        set.engine
            .context()
            .spawn(&format!("{} -> join round", set.name()), driver.drive(snapshot));
    }

    /// Hands out the next snapshot, or closes the round when nothing was added.
    fn next_round(&mut self, set: &JoinSet) -> Option<Vec<TaskHandle>> {
        if !self.tracked.is_empty() {
            let snapshot = std::mem::take(&mut self.tracked);
            set.publish(EventKind::JoinRoundStarted, snapshot.len());
            return Some(snapshot);
        }

        let gates = self.round.take().unwrap_or_default();
        let released = gates.len();
        for gate in gates {
            let _ = gate.send(());
        }
        set.publish(EventKind::JoinRoundFinished, released);
        tracing::trace!(join_set = %set.name(), released, "join round finished");
        None
    }

    fn is_empty(&mut self) -> bool {
        self.tracked.retain(|h| !h.is_finished());
        self.round.is_none() && self.tracked.is_empty()
    }
}

/// Tracker of outstanding background tasks with a draining `join`.
#[derive(Clone, Debug)]
pub struct JoinSet {
    name: Arc<str>,
    engine: Engine<Tracker>,
}

impl JoinSet {
    /// Creates an empty set; its engine mailbox is unbounded, so registration never waits.
    pub fn new(ctx: &Context, name: impl Into<Arc<str>>) -> Self {
        let name: Arc<str> = name.into();
        let engine = Engine::with_capacity(
            ctx,
            format!("{name} -> join set"),
            Capacity::Unbounded,
            Tracker {
                tracked: Vec::new(),
                round: None,
            },
        );
        Self { name, engine }
    }

    /// Set name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a handle to the tracked set.
    pub async fn register(&self, handle: TaskHandle) -> Result<(), EngineError> {
        self.engine
            .tell_with(move |t| t.tracked.push(handle))
            .await
    }

    /// Non-suspending [`register`](Self::register); fails only once the set was stopped.
    pub fn offer(&self, handle: TaskHandle) -> Result<(), EngineError> {
        self.engine.try_send(move |t| {
            Box::pin(async move { t.tracked.push(handle) })
        })
    }

    /// Waits until every registered task, and every task registered meanwhile, has finished.
    ///
    /// Fails with [`EngineError::Closed`] if the set is stopped before the round ends.
    pub async fn join(&self) -> Result<(), EngineError> {
        let (gate, opened) = oneshot::channel();
        let me = self.clone();
        self.engine.tell_with(move |t| t.attach(gate, &me)).await?;
        opened.await.map_err(|_| EngineError::Closed)
    }

    /// True when no round is active and no unfinished task is tracked.
    pub async fn is_empty(&self) -> Result<bool, EngineError> {
        self.engine.ask_with(|t| t.is_empty()).await
    }

    /// Stops the set's engine; pending `join` calls fail with [`EngineError::Closed`].
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.engine.request_stop().await
    }

    async fn drive(self, mut snapshot: Vec<TaskHandle>) {
        loop {
            for handle in &snapshot {
                handle.finished().await;
            }
            let me = self.clone();
            match self.engine.ask_with(move |t| t.next_round(&me)).await {
                Ok(Some(next)) => snapshot = next,
                Ok(None) => return,
                Err(e) => {
                    tracing::debug!(join_set = %self.name, error = %e, "join round abandoned");
                    return;
                }
            }
        }
    }

    fn publish(&self, kind: EventKind, count: usize) {
        self.engine.context().publish(
            Event::new(kind)
                .with_owner(Arc::clone(&self.name))
                .with_count(count),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn ctx() -> Context {
        Context::new(Config::default())
    }

    #[tokio::test]
    async fn join_on_empty_set_returns_immediately() {
        let set = JoinSet::new(&ctx(), "empty");
        set.join().await.expect("join");
        assert_eq!(set.is_empty().await, Ok(true));
    }

    #[tokio::test(start_paused = true)]
    async fn join_waits_for_tasks_registered_during_the_wait() {
        let ctx = ctx();
        let set = JoinSet::new(&ctx, "nested");
        let b_done = Arc::new(AtomicBool::new(false));

        let a = {
            let set = set.clone();
            let ctx2 = ctx.clone();
            let b_done = Arc::clone(&b_done);
            ctx.spawn_tracked("a", async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                let b = ctx2.spawn_tracked("b", async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    b_done.store(true, Ordering::SeqCst);
                });
                set.register(b).await.expect("register b");
            })
        };
        set.register(a.clone()).await.expect("register a");

        set.join().await.expect("join");
        assert!(a.is_finished());
        assert!(b_done.load(Ordering::SeqCst));
        assert_eq!(set.is_empty().await, Ok(true));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_joins_share_one_round() {
        let ctx = ctx();
        let mut events = ctx.bus().subscribe();
        let set = JoinSet::new(&ctx, "shared");
        set.offer(ctx.spawn_tracked("slow", async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }))
        .expect("offer");

        let first = {
            let set = set.clone();
            tokio::spawn(async move { set.join().await })
        };
        let second = {
            let set = set.clone();
            tokio::spawn(async move { set.join().await })
        };
        first.await.expect("first").expect("join");
        second.await.expect("second").expect("join");

        let started: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| e.kind == EventKind::JoinRoundStarted)
            .collect();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].count, Some(1));
    }

    #[tokio::test]
    async fn panicked_task_counts_as_finished() {
        let ctx = ctx();
        let set = JoinSet::new(&ctx, "failing");
        set.offer(ctx.spawn_tracked("explodes", async { panic!("task failed") }))
            .expect("offer");
        set.join().await.expect("join");
    }

    #[tokio::test]
    async fn join_fails_when_the_set_stops_mid_round() {
        let ctx = ctx();
        let set = JoinSet::new(&ctx, "stopping");
        let (_hold, never) = oneshot::channel::<()>();
        set.offer(ctx.spawn_tracked("stuck", async move {
            let _ = never.await;
        }))
        .expect("offer");

        let waiter = {
            let set = set.clone();
            tokio::spawn(async move { set.join().await })
        };
        tokio::task::yield_now().await;
        set.stop().await.expect("stop");

        assert_eq!(waiter.await.expect("join task"), Err(EngineError::Closed));
        assert_eq!(set.offer(TaskHandle::completed("late")), Err(EngineError::Closed));
    }
}
