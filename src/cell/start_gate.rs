//! # Start gate: defer actions until a value is initialized.
//!
//! ```text
//! run_on_start(a)        before initialized() → queued
//!                        after  initialized() → runs now
//! run_on_not_started(f)  before initialized() → value = f(value)
//!                        after  initialized() → ignored
//! initialized()          runs queued actions in registration order, then opens the gate
//! ```
//!
//! All three are messages on one engine, so "before" and "after" refer to the
//! engine's processing order, not to wall-clock time.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::core::{Capacity, Context, Engine, TaskHandle};
use crate::error::{EngineError, panic_reason};

type Deferred<T> = Box<dyn FnOnce(&T) + Send>;

struct GateState<T> {
    value: T,
    deferred: Vec<Deferred<T>>,
    open: bool,
}

impl<T> GateState<T> {
    fn release(&mut self, gate: &str) {
        self.open = true;
        for action in std::mem::take(&mut self.deferred) {
            run_guarded(gate, action, &self.value);
        }
    }
}

/// Runs one action; a panic is logged and does not stop the remaining ones.
fn run_guarded<T>(gate: &str, action: Deferred<T>, value: &T) {
    if let Err(p) = std::panic::catch_unwind(AssertUnwindSafe(|| action(value))) {
        tracing::warn!(gate, reason = %panic_reason(&*p), "start action panicked");
    }
}

/// Gate holding a value plus the actions waiting for it to be initialized.
pub struct StartGate<T> {
    name: Arc<str>,
    engine: Engine<GateState<T>>,
}

impl<T> Clone for StartGate<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            engine: self.engine.clone(),
        }
    }
}

impl<T: Send + 'static> StartGate<T> {
    /// Creates a closed gate holding `value`.
    pub fn new(ctx: &Context, name: impl Into<Arc<str>>, value: T) -> Self {
        let name: Arc<str> = name.into();
        let engine = Engine::with_capacity(
            ctx,
            format!("{name} -> start gate"),
            Capacity::Unbounded,
            GateState {
                value,
                deferred: Vec::new(),
                open: false,
            },
        );
        Self { name, engine }
    }

    /// Runs `action` with the value once the gate is open (immediately if it already is).
    ///
    /// The handle finishes once the action ran or was queued.
    pub fn run_on_start<F>(&self, action: F) -> TaskHandle
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let gate = Arc::clone(&self.name);
        self.post("run on start", move |state| {
            if state.open {
                run_guarded(&gate, Box::new(action), &state.value);
            } else {
                state.deferred.push(Box::new(action));
            }
        })
    }

    /// Replaces the value with `transform(value)` while the gate is still closed.
    pub fn run_on_not_started<F>(&self, transform: F) -> TaskHandle
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.post("run on not started", move |state| {
            if !state.open {
                state.value = transform(&state.value);
            }
        })
    }

    /// Opens the gate and runs every deferred action in registration order.
    pub fn initialized(&self) -> TaskHandle {
        let gate = Arc::clone(&self.name);
        self.post("initialized", move |state| {
            if state.open {
                return;
            }
            tracing::debug!(gate = %gate, deferred = state.deferred.len(), "gate opened");
            state.release(&gate);
        })
    }

    /// True once [`initialized`](Self::initialized) was processed.
    pub async fn is_initialized(&self) -> Result<bool, EngineError> {
        self.engine.ask_with(|state| state.open).await
    }

    /// Current value.
    pub async fn value(&self) -> Result<T, EngineError>
    where
        T: Clone,
    {
        self.engine.ask_with(|state| state.value.clone()).await
    }

    /// Waits until every queued gate operation was processed.
    pub async fn wait_idle(&self) -> Result<(), EngineError> {
        self.engine.wait_until_idle(|_| Box::pin(async {})).await
    }

    fn post<F>(&self, what: &str, body: F) -> TaskHandle
    where
        F: FnOnce(&mut GateState<T>) + Send + 'static,
    {
        let (handle, done) = TaskHandle::pair(format!("{} -> {what}", self.name));
        self.engine.post(move |state| {
            Box::pin(async move {
                let _done = done;
                body(state);
            })
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn deferred_actions_run_once_on_initialization() {
        let ctx = Context::new(Config::default());
        let gate = StartGate::new(&ctx, "unit", ());
        let on_not_start = Arc::new(AtomicU32::new(0));
        let on_start = Arc::new(AtomicU32::new(0));
        let on_start2 = Arc::new(AtomicU32::new(0));

        let flag = Arc::clone(&on_start);
        gate.run_on_start(move |_| flag.store(1, Ordering::SeqCst))
            .finished()
            .await;
        let flag = Arc::clone(&on_not_start);
        gate.run_on_not_started(move |_| flag.store(1, Ordering::SeqCst))
            .finished()
            .await;
        assert_eq!(on_start.load(Ordering::SeqCst), 0, "deferred until initialized");

        gate.initialized().finished().await;
        let flag = Arc::clone(&on_not_start);
        gate.run_on_not_started(move |_| flag.store(2, Ordering::SeqCst))
            .finished()
            .await;
        let flag = Arc::clone(&on_start2);
        gate.run_on_start(move |_| flag.store(1, Ordering::SeqCst))
            .finished()
            .await;
        gate.wait_idle().await.expect("idle");

        assert_eq!(on_not_start.load(Ordering::SeqCst), 1);
        assert_eq!(on_start.load(Ordering::SeqCst), 1);
        assert_eq!(on_start2.load(Ordering::SeqCst), 1);
        assert_eq!(gate.is_initialized().await, Ok(true));
    }

    #[tokio::test]
    async fn value_changes_only_before_initialization() {
        let ctx = Context::new(Config::default());
        let gate = StartGate::new(&ctx, "counter", 1_u32);
        let seen = Arc::new(AtomicU32::new(0));

        let early = Arc::clone(&seen);
        gate.run_on_start(move |v| early.store(*v, Ordering::SeqCst));
        gate.run_on_not_started(|_| 5);
        gate.initialized();
        gate.run_on_not_started(|_| 6);
        gate.wait_idle().await.expect("idle");

        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(gate.value().await, Ok(5));
    }

    #[tokio::test]
    async fn panicking_action_does_not_block_the_others() {
        let ctx = Context::new(Config::default());
        let gate = StartGate::new(&ctx, "sturdy", ());
        let ran = Arc::new(AtomicU32::new(0));

        gate.run_on_start(|_| panic!("first action fails"));
        let flag = Arc::clone(&ran);
        gate.run_on_start(move |_| {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        gate.initialized().finished().await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(gate.is_initialized().await, Ok(true));
    }
}
