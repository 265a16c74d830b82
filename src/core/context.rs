//! # Scheduling context.
//!
//! A [`Context`] is the explicit "where do background tasks run" value that every
//! primitive receives in its constructor. Nothing in this crate reaches for an
//! implicit global scope; the only place a default is chosen is the outermost
//! composition root calling [`Context::new`].
//!
//! It bundles:
//! - the tokio runtime [`Handle`] tasks are spawned on,
//! - the event [`Bus`] primitives publish to,
//! - the [`Config`],
//! - a root [`CancellationToken`]; [`Context::shutdown`] cancels it, which stops
//!   armed timers and the subscriber listener.
//!
//! ## Example
//! ```rust
//! use coact::{Config, Context};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let ctx = Context::builder(Config::default()).build();
//!     let job = ctx.spawn_tracked("hello", async { println!("hello"); });
//!     job.finished().await;
//!     ctx.shutdown();
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::{runtime::Handle, sync::broadcast::error::RecvError, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::{config::Config, handle::TaskHandle};
use crate::events::{Bus, Event};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Explicit scheduling context threaded through all constructors.
#[derive(Clone, Debug)]
pub struct Context {
    handle: Handle,
    bus: Bus,
    config: Arc<Config>,
    token: CancellationToken,
}

impl Context {
    /// Creates a context on the current tokio runtime without subscribers.
    ///
    /// Must be called from within a tokio runtime; use
    /// [`ContextBuilder::with_handle`] otherwise.
    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    /// Starts building a context.
    pub fn builder(config: Config) -> ContextBuilder {
        ContextBuilder::new(config)
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Event bus shared by every primitive created from this context.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Publishes one event on the bus.
    pub fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }

    /// Spawns a named background task.
    pub fn spawn<F>(&self, name: &str, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let span = tracing::trace_span!("coact.task", name = %name);
        self.handle.spawn(fut.instrument(span))
    }

    /// Spawns a named background task and returns a clonable completion handle.
    pub fn spawn_tracked<F>(&self, name: &str, fut: F) -> TaskHandle
    where
        F: Future + Send + 'static,
    {
        let (handle, guard) = TaskHandle::pair(name);
        self.spawn(name, async move {
            let _guard = guard;
            fut.await;
        });
        handle
    }

    /// Token cancelled on [`Context::shutdown`]; children are handed to timers.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Cancels every timer and listener derived from this context.
    ///
    /// Engines are not stopped; they stop through their own `request_stop`.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// True once [`Context::shutdown`] was called.
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Builder for constructing a [`Context`] with optional subscribers.
pub struct ContextBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    handle: Option<Handle>,
}

impl ContextBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            handle: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Spawns onto `handle` instead of the runtime current at `build()`.
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Builds the context.
    ///
    /// When subscribers were given, a listener task forwards bus events to them
    /// until the context is shut down.
    pub fn build(self) -> Context {
        let handle = self.handle.unwrap_or_else(Handle::current);
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let token = CancellationToken::new();

        let ctx = Context {
            handle,
            bus,
            config: Arc::new(self.cfg),
            token,
        };

        if !self.subscribers.is_empty() {
            let set = SubscriberSet::new(self.subscribers, ctx.bus.clone(), &ctx.handle);
            spawn_subscriber_listener(&ctx, set);
        }
        ctx
    }
}

/// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
fn spawn_subscriber_listener(ctx: &Context, set: SubscriberSet) {
    let mut rx = ctx.bus.subscribe();
    let token = ctx.token.clone();
    ctx.spawn("subscriber-listener", async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        set.shutdown().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<EventKind>);

    #[async_trait]
    impl Subscribe for Forward {
        async fn on_event(&self, event: &Event) {
            let _ = self.0.send(event.kind);
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = Context::builder(Config::default())
            .with_subscribers(vec![Arc::new(Forward(tx))])
            .build();

        ctx.publish(Event::new(EventKind::EngineStopped));

        assert_eq!(rx.recv().await, Some(EventKind::EngineStopped));
        ctx.shutdown();
        assert!(ctx.is_shutdown());
    }

    #[tokio::test]
    async fn tracked_task_finishes_even_when_it_panics() {
        let ctx = Context::new(Config::default());
        let h = ctx.spawn_tracked("explodes", async { panic!("boom") });
        h.finished().await;
        assert!(h.is_finished());
    }
}
