//! # Actor cell: one value behind an engine.
//!
//! Reads and updates of the value are engine messages, so they never overlap.
//! Updates are transforms `&T -> T`; a transform that panics leaves the old value
//! in place.
//!
//! After every applied change the cell runs, in order:
//! 1. the [`Rescheduler`], if attached (cancel the pending timer, maybe arm a new one);
//! 2. the `on_every_change` observer, if set.
//!
//! A cell built with a rescheduler also evaluates its initial value once, as the
//! first message of its mailbox.
//!
//! Cells default to an unbounded mailbox: [`ActorCell::change`] then enqueues
//! before returning, and changes issued by one caller apply in call order.
//!
//! ## Example
//! ```rust
//! use coact::{ActorCell, Config, Context};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), coact::EngineError> {
//!     let ctx = Context::new(Config::default());
//!     let cell = ActorCell::new(&ctx, "greeting", String::from("hello"));
//!
//!     cell.change(|s| format!("{s},"));
//!     let now = cell.change_and_await(|s| format!("{s} world")).await?;
//!     assert_eq!(now, "hello, world");
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cell::rescheduler::Rescheduler;
use crate::core::{Capacity, Context, Engine, TaskHandle};
use crate::error::EngineError;
use crate::events::{Event, EventKind};
use crate::time::{Clock, Tick};

type Observer<T> = Box<dyn Fn(&T) + Send>;

struct CellState<T> {
    value: T,
    rescheduler: Option<Rescheduler<T>>,
    observer: Option<Observer<T>>,
}

impl<T: Send + 'static> CellState<T> {
    fn apply<F: FnOnce(&T) -> T>(&mut self, transform: F, cell: &ActorCell<T>) {
        self.value = transform(&self.value);
        if let Some(rescheduler) = self.rescheduler.as_mut() {
            rescheduler.after_change(&self.value, cell);
        }
        if let Some(observer) = &self.observer {
            observer(&self.value);
        }
    }

    fn arm_initial(&mut self, cell: &ActorCell<T>) {
        if let Some(rescheduler) = self.rescheduler.as_mut() {
            rescheduler.after_change(&self.value, cell);
        }
    }

    fn fire(&mut self, token: &CancellationToken, tick: Tick, cell: &ActorCell<T>) {
        let Some(elapsed) = self.rescheduler.as_mut().and_then(|r| r.claim(token)) else {
            tracing::trace!(cell = %cell.name(), tick, "superseded timer ignored");
            return;
        };
        cell.publish(Event::new(EventKind::TimerFired).with_tick(tick));
        self.apply(|value| elapsed(value, tick), cell);
    }
}

/// Serialized holder of one value, with optional timed follow-up changes.
pub struct ActorCell<T> {
    name: Arc<str>,
    engine: Engine<CellState<T>>,
}

impl<T> Clone for ActorCell<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            engine: self.engine.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ActorCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorCell")
            .field("name", &self.name)
            .finish()
    }
}

impl<T: Send + 'static> ActorCell<T> {
    /// Creates a plain cell holding `value`.
    pub fn new(ctx: &Context, name: impl Into<Arc<str>>, value: T) -> Self {
        Self::builder(name, value).build(ctx)
    }

    /// Starts building a cell.
    pub fn builder(name: impl Into<Arc<str>>, value: T) -> CellBuilder<T> {
        CellBuilder {
            name: name.into(),
            value,
            rescheduler: None,
            observer: None,
            capacity: Capacity::Unbounded,
        }
    }

    /// Cell name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the value with `transform(current)` without waiting.
    ///
    /// The returned handle finishes once the change was applied, or dropped
    /// because the cell is stopped.
    pub fn change<F>(&self, transform: F) -> TaskHandle
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        let (handle, applied) = TaskHandle::pair(format!("{} -> change", self.name));
        let cell = self.clone();
        self.engine.post(move |state| {
            Box::pin(async move {
                let _applied = applied;
                state.apply(transform, &cell);
            })
        });
        handle
    }

    /// Queues a change, suspending only while a bounded mailbox is full.
    pub async fn change_queued<F>(&self, transform: F) -> Result<(), EngineError>
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        let cell = self.clone();
        self.engine
            .tell_with(move |state| state.apply(transform, &cell))
            .await
    }

    /// Applies a change and returns the new value.
    pub async fn change_and_await<F>(&self, transform: F) -> Result<T, EngineError>
    where
        F: FnOnce(&T) -> T + Send + 'static,
        T: Clone,
    {
        let cell = self.clone();
        self.engine
            .ask_with(move |state| {
                state.apply(transform, &cell);
                state.value.clone()
            })
            .await
    }

    /// Reads the value in a background task.
    pub fn read(&self) -> JoinHandle<Result<T, EngineError>>
    where
        T: Clone,
    {
        let me = self.clone();
        self.engine
            .context()
            .spawn(&format!("{} -> read", self.name), async move { me.read_await().await })
    }

    /// Reads the value.
    pub async fn read_await(&self) -> Result<T, EngineError>
    where
        T: Clone,
    {
        self.engine.ask_with(|state| state.value.clone()).await
    }

    /// Runs `body` against the value without waiting; no change can interleave.
    pub fn on_data<F>(&self, body: F) -> TaskHandle
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let (handle, ran) = TaskHandle::pair(format!("{} -> on data", self.name));
        self.engine.post(move |state| {
            Box::pin(async move {
                let _ran = ran;
                body(&state.value);
            })
        });
        handle
    }

    /// Runs `body` against the value and returns its result.
    pub async fn on_data_await<R, F>(&self, body: F) -> Result<R, EngineError>
    where
        F: FnOnce(&T) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.engine.ask_with(move |state| body(&state.value)).await
    }

    /// True while the rescheduler has a pending timer.
    pub async fn is_armed(&self) -> Result<bool, EngineError> {
        self.engine
            .ask_with(|state| state.rescheduler.as_ref().is_some_and(Rescheduler::is_armed))
            .await
    }

    /// Waits until the mailbox is empty, including changes queued meanwhile.
    pub async fn wait_idle(&self) -> Result<(), EngineError> {
        self.engine.wait_until_idle(|_| Box::pin(async {})).await
    }

    /// Requests a graceful stop: queued changes still apply, later ones are refused.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.engine.request_stop().await
    }

    /// Resolves once the cell's worker has exited.
    pub async fn stopped(&self) {
        self.engine.stopped().await
    }

    pub(crate) fn context(&self) -> &Context {
        self.engine.context()
    }

    pub(crate) fn publish(&self, ev: Event) {
        self.context().publish(ev.with_owner(Arc::clone(&self.name)));
    }

    /// Sleeps until `target` unless `token` is cancelled first, then asks the engine to fire.
    pub(crate) fn spawn_timer(
        &self,
        clock: Arc<dyn Clock>,
        token: CancellationToken,
        target: Tick,
        delay: Tick,
    ) {
        let cell = self.clone();
        let live = token.clone();
        let task = format!("{} -> timer @{target}", self.name);
        tracing::trace!(cell = %self.name, target, delay, "timer armed");
        self.context().spawn(&task, async move {
            tokio::select! {
                _ = live.cancelled() => {}
                _ = clock.sleep_until(target) => cell.fire(token, target),
            }
        });
    }

    fn fire(&self, token: CancellationToken, tick: Tick) {
        let cell = self.clone();
        self.engine.post(move |state| {
            Box::pin(async move {
                state.fire(&token, tick, &cell);
            })
        });
    }
}

/// Builder for an [`ActorCell`].
pub struct CellBuilder<T> {
    name: Arc<str>,
    value: T,
    rescheduler: Option<Rescheduler<T>>,
    observer: Option<Observer<T>>,
    capacity: Capacity,
}

impl<T: Send + 'static> CellBuilder<T> {
    /// Attaches a timer policy.
    pub fn rescheduler(mut self, rescheduler: Rescheduler<T>) -> Self {
        self.rescheduler = Some(rescheduler);
        self
    }

    /// Runs `observer` inside the engine after every applied change.
    pub fn on_every_change<F>(mut self, observer: F) -> Self
    where
        F: Fn(&T) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Overrides the mailbox capacity (default: unbounded).
    pub fn capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Spawns the cell's engine on `ctx`.
    pub fn build(self, ctx: &Context) -> ActorCell<T> {
        let timed = self.rescheduler.is_some();
        let engine = Engine::with_capacity(
            ctx,
            format!("{} -> cell", self.name),
            self.capacity,
            CellState {
                value: self.value,
                rescheduler: self.rescheduler,
                observer: self.observer,
            },
        );
        let cell = ActorCell {
            name: self.name,
            engine,
        };

        if timed {
            let me = cell.clone();
            let first = cell.engine.try_send(move |state| {
                Box::pin(async move {
                    state.arm_initial(&me);
                })
            });
            if let Err(e) = first {
                tracing::warn!(cell = %cell.name, error = %e, "initial value not scheduled");
            }
        }
        cell
    }
}
