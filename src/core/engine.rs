//! # Engine: serialized execution for one named owner.
//!
//! An [`Engine`] owns a piece of state `S` and one worker task. Every access to
//! the state is a message queued on the engine's mailbox; the worker runs the
//! messages strictly one at a time, in the order they were accepted. No lock
//! guards the state: the worker is its only owner.
//!
//! ## Architecture
//! ```text
//!   ask(body) ──┐                                  ┌──► body(&mut S) ──► reply sink
//!   tell(body) ─┼──► [mailbox FIFO] ──► worker ────┼──► body(&mut S)    (panic → MessageFailed)
//!   request_stop┘                        loop      └──► Stop: close mailbox, drop the rest
//! ```
//!
//! ## Rules
//! - At most one body executes at a time for a given engine.
//! - A panicking body never kills the worker; `ask` callers get
//!   [`EngineError::Panicked`], fire-and-forget failures are published as
//!   [`EventKind::MessageFailed`].
//! - After the stop message is processed the engine is closed: every send fails
//!   with [`EngineError::Closed`] instead of waiting forever. Messages queued behind
//!   the stop message are discarded.
//!
//! ## Example
//! ```rust
//! use coact::{Config, Context, Engine};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), coact::EngineError> {
//!     let ctx = Context::new(Config::default());
//!     let counter = Engine::new(&ctx, "counter", 0_u64);
//!
//!     counter.tell_with(|n| *n += 1).await?;
//!     let n = counter.ask(|n| Box::pin(async move { *n += 1; *n })).await?;
//!     assert_eq!(n, 2);
//!
//!     counter.request_stop().await?;
//!     counter.stopped().await;
//!     assert!(counter.tell_with(|n| *n += 1).await.is_err());
//!     Ok(())
//! }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::{FutureExt, future::BoxFuture};
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::core::{
    config::Capacity,
    context::Context,
    mailbox::{Job, MailboxReceiver, MailboxSender, Message, job, mailbox},
};
use crate::error::{EngineError, panic_reason};
use crate::events::{Event, EventKind};

/// State shared between engine handles and the worker.
struct Shared {
    /// `false` once the stop message was processed.
    open: AtomicBool,
    /// Messages accepted (or being accepted) but not yet dequeued.
    pending: AtomicUsize,
    /// Cancelled when the worker loop has exited.
    stopped: CancellationToken,
}

/// Counts one message as pending until it was committed to the mailbox.
///
/// Dropping an uncommitted slot, for instance when a send waiting on a full
/// mailbox is cancelled, gives the count back.
struct PendingSlot<'a> {
    shared: &'a Shared,
    committed: bool,
}

impl<'a> PendingSlot<'a> {
    fn reserve(shared: &'a Shared) -> Self {
        shared.pending.fetch_add(1, Ordering::SeqCst);
        Self {
            shared,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Clonable handle to a serialized executor owning state `S`.
pub struct Engine<S> {
    name: Arc<str>,
    tx: MailboxSender<S>,
    shared: Arc<Shared>,
    ctx: Context,
}

impl<S> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
            ctx: self.ctx.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl<S> Engine<S> {
    /// Owner name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scheduling context this engine spawns on.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// `false` once the stop message was processed.
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Resolves once the worker loop has exited.
    pub async fn stopped(&self) {
        self.shared.stopped.cancelled().await
    }
}

impl<S: Send + 'static> Engine<S> {
    /// Creates an engine with the context's default mailbox capacity.
    pub fn new(ctx: &Context, name: impl Into<Arc<str>>, state: S) -> Self {
        Self::with_capacity(ctx, name, ctx.config().mailbox, state)
    }

    /// Creates an engine with an explicit mailbox capacity and spawns its worker.
    pub fn with_capacity(
        ctx: &Context,
        name: impl Into<Arc<str>>,
        capacity: Capacity,
        state: S,
    ) -> Self {
        let name = name.into();
        let (tx, rx) = mailbox(capacity);
        let shared = Arc::new(Shared {
            open: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
            stopped: CancellationToken::new(),
        });

        let worker = Worker {
            name: Arc::clone(&name),
            shared: Arc::clone(&shared),
            ctx: ctx.clone(),
        };
        ctx.spawn(&format!("{name} -> worker"), worker.run(state, rx));

        Self {
            name,
            tx,
            shared,
            ctx: ctx.clone(),
        }
    }

    /// Runs `body` on the state and returns its value.
    ///
    /// Suspends until the body has run. A panic inside the body is delivered here
    /// as [`EngineError::Panicked`]; the engine keeps running.
    pub async fn ask<R, F>(&self, body: F) -> Result<R, EngineError>
    where
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, R> + Send + 'static,
        R: Send + 'static,
    {
        let (reply, answer) = oneshot::channel();
        let envelope = job(move |state| {
            Box::pin(async move {
                let res = AssertUnwindSafe(async move { body(state).await })
                    .catch_unwind()
                    .await
                    .map_err(|p| EngineError::Panicked {
                        reason: panic_reason(&*p),
                    });
                let _ = reply.send(res);
            })
        });

        self.enqueue(Message::RunWithResult(envelope)).await?;
        answer.await.map_err(|_| EngineError::Closed)?
    }

    /// [`ask`](Self::ask) with a synchronous body.
    pub async fn ask_with<R, F>(&self, body: F) -> Result<R, EngineError>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.ask(move |state| Box::pin(async move { body(state) }))
            .await
    }

    /// Queues `body`; suspends only while the mailbox is full.
    pub async fn tell<F>(&self, body: F) -> Result<(), EngineError>
    where
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
    {
        let body: Job<S> = Box::new(body);
        self.enqueue(Message::Run(body)).await
    }

    /// [`tell`](Self::tell) with a synchronous body.
    pub async fn tell_with<F>(&self, body: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tell(move |state| Box::pin(async move { body(state) }))
            .await
    }

    /// Non-suspending [`tell`](Self::tell); `false` when the mailbox is full or closed.
    pub fn try_tell<F>(&self, body: F) -> bool
    where
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
    {
        self.try_send(body).is_ok()
    }

    /// Non-suspending [`tell`](Self::tell) that reports why the message was refused.
    pub fn try_send<F>(&self, body: F) -> Result<(), EngineError>
    where
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
    {
        if !self.is_open() {
            return Err(EngineError::Closed);
        }
        let slot = PendingSlot::reserve(&self.shared);
        let body: Job<S> = Box::new(body);
        self.tx.try_send(Message::Run(body))?;
        slot.commit();
        Ok(())
    }

    /// Spawns a task whose only job is to [`tell`](Self::tell) `body`.
    ///
    /// For callers that must not block on mailbox capacity themselves. The handle
    /// resolves once the message was accepted (not executed).
    pub fn tell_async<F>(&self, body: F) -> JoinHandle<Result<(), EngineError>>
    where
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
    {
        let me = self.clone();
        self.ctx
            .spawn(&format!("{} -> tell", self.name), async move { me.tell(body).await })
    }

    /// Queues `body` without suspending and without reporting back.
    ///
    /// On an unbounded mailbox the message is enqueued before this returns, so
    /// successive posts from one caller run in call order. On a bounded mailbox
    /// the send moves to a background task, as with [`tell_async`](Self::tell_async).
    /// A refused message is dropped unexecuted and logged.
    pub fn post<F>(&self, body: F)
    where
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
    {
        if self.tx.is_unbounded() {
            if let Err(e) = self.try_send(body) {
                tracing::debug!(
                    engine = %self.name,
                    error = %e,
                    retryable = e.is_retryable(),
                    "posted message refused"
                );
            }
            return;
        }
        let me = self.clone();
        self.ctx.spawn(&format!("{} -> post", self.name), async move {
            if let Err(e) = me.tell(body).await {
                tracing::debug!(engine = %me.name, error = %e, "posted message refused");
            }
        });
    }

    /// Queues the stop message.
    ///
    /// Messages accepted before it still run; afterwards the mailbox is closed.
    pub async fn request_stop(&self) -> Result<(), EngineError> {
        self.enqueue(Message::Stop).await
    }

    /// Repeatedly runs `check` and tests for an empty mailbox, as one message, until
    /// the mailbox is empty right after `check` returned.
    pub async fn wait_until_idle<F>(&self, mut check: F) -> Result<(), EngineError>
    where
        F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
    {
        loop {
            let shared = Arc::clone(&self.shared);
            let (returned, idle) = self
                .ask(move |state| {
                    Box::pin(async move {
                        let mut check = check;
                        check(state).await;
                        let idle = shared.pending.load(Ordering::SeqCst) == 0;
                        (check, idle)
                    })
                })
                .await?;
            if idle {
                return Ok(());
            }
            check = returned;
        }
    }

    async fn enqueue(&self, msg: Message<S>) -> Result<(), EngineError> {
        if !self.is_open() {
            return Err(EngineError::Closed);
        }
        let slot = PendingSlot::reserve(&self.shared);
        self.tx.send(msg).await?;
        slot.commit();
        Ok(())
    }
}

/// The single consumer of an engine's mailbox.
struct Worker {
    name: Arc<str>,
    shared: Arc<Shared>,
    ctx: Context,
}

impl Worker {
    async fn run<S: Send + 'static>(self, mut state: S, mut rx: MailboxReceiver<S>) {
        let _stopped = self.shared.stopped.clone().drop_guard();

        while let Some(msg) = rx.recv().await {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            match msg {
                Message::Run(body) => {
                    let run = async { body(&mut state).await };
                    if let Err(p) = AssertUnwindSafe(run).catch_unwind().await {
                        self.report_failure(panic_reason(&*p));
                    }
                }
                Message::RunWithResult(body) => body(&mut state).await,
                Message::Stop => {
                    self.close(&mut rx);
                    break;
                }
            }
            tracing::trace!(engine = %self.name, "handled message");
        }
        tracing::trace!(engine = %self.name, "worker finished");
    }

    fn report_failure(&self, reason: String) {
        tracing::error!(engine = %self.name, %reason, "message body panicked");
        self.ctx.publish(
            Event::new(EventKind::MessageFailed)
                .with_owner(Arc::clone(&self.name))
                .with_reason(reason),
        );
    }

    fn close<S>(&self, rx: &mut MailboxReceiver<S>) {
        self.shared.open.store(false, Ordering::SeqCst);
        rx.close();

        let mut discarded = 0;
        while rx.try_recv().is_some() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(engine = %self.name, discarded, "dropped messages queued after stop");
            self.ctx.publish(
                Event::new(EventKind::MessagesDiscarded)
                    .with_owner(Arc::clone(&self.name))
                    .with_count(discarded),
            );
        }
        self.ctx
            .publish(Event::new(EventKind::EngineStopped).with_owner(Arc::clone(&self.name)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use std::time::Duration;

    fn ctx() -> Context {
        Context::new(Config::default())
    }

    #[tokio::test]
    async fn debug_reports_name_and_open_state() {
        let engine = Engine::new(&ctx(), "shown", ());
        assert_eq!(format!("{engine:?}"), r#"Engine { name: "shown", open: true }"#);

        engine.request_stop().await.expect("stop");
        engine.stopped().await;
        assert_eq!(format!("{engine:?}"), r#"Engine { name: "shown", open: false }"#);
    }

    #[tokio::test]
    async fn ask_returns_body_value() {
        let engine = Engine::new(&ctx(), "ask", 41_u32);
        let v = engine
            .ask(|n| Box::pin(async move {
                *n += 1;
                *n
            }))
            .await
            .expect("ask");
        assert_eq!(v, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_never_lost() {
        let engine = Engine::with_capacity(&ctx(), "counter", Capacity::Bounded(4), 0_u64);

        let mut callers = Vec::new();
        for i in 0..32 {
            let engine = engine.clone();
            callers.push(tokio::spawn(async move {
                for _ in 0..25 {
                    if i % 2 == 0 {
                        engine
                            .tell(|n| Box::pin(async move {
                                let seen = *n;
                                tokio::task::yield_now().await;
                                *n = seen + 1;
                            }))
                            .await
                            .expect("tell");
                    } else {
                        engine.ask_with(|n| *n += 1).await.expect("ask");
                    }
                }
            }));
        }
        for c in callers {
            c.await.expect("caller");
        }

        assert_eq!(engine.ask_with(|n| *n).await.expect("read"), 32 * 25);
    }

    #[tokio::test]
    async fn messages_from_one_caller_run_in_order() {
        let engine = Engine::with_capacity(&ctx(), "order", Capacity::Unbounded, Vec::new());
        for i in 0..50 {
            engine.tell_with(move |v| v.push(i)).await.expect("tell");
        }
        let seen = engine.ask_with(|v| v.clone()).await.expect("ask");
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn panicking_body_does_not_kill_the_engine() {
        let ctx = ctx();
        let mut events = ctx.bus().subscribe();
        let engine = Engine::new(&ctx, "fragile", 0_u32);

        engine
            .tell_with(|_| panic!("tell failed"))
            .await
            .expect("accepted");
        let err = engine
            .ask_with(|_| -> u32 { panic!("ask failed") })
            .await
            .expect_err("panics surface to the asker");
        assert_eq!(
            err,
            EngineError::Panicked {
                reason: "ask failed".into()
            }
        );

        assert_eq!(engine.ask_with(|n| { *n += 1; *n }).await, Ok(1));

        let ev = events.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::MessageFailed);
        assert_eq!(ev.reason.as_deref(), Some("tell failed"));
    }

    #[tokio::test]
    async fn sends_after_stop_fail() {
        let engine = Engine::new(&ctx(), "stoppable", ());
        engine.request_stop().await.expect("stop");
        engine.stopped().await;

        assert!(!engine.is_open());
        assert_eq!(engine.ask_with(|_| ()).await, Err(EngineError::Closed));
        assert_eq!(engine.tell_with(|_| ()).await, Err(EngineError::Closed));
        assert!(!engine.try_tell(|_| Box::pin(async {})));
        assert_eq!(engine.request_stop().await, Err(EngineError::Closed));
    }

    #[tokio::test]
    async fn messages_before_stop_still_run() {
        let engine = Engine::with_capacity(&ctx(), "drain", Capacity::Unbounded, 0_u32);
        let (tx, rx) = oneshot::channel();
        engine
            .tell(|_| Box::pin(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }))
            .await
            .expect("tell");
        engine.tell_with(|n| *n = 7).await.expect("tell");
        engine
            .tell_with(move |n| {
                let _ = tx.send(*n);
            })
            .await
            .expect("tell");
        engine.request_stop().await.expect("stop");

        assert_eq!(rx.await, Ok(7));
        engine.stopped().await;
    }

    #[tokio::test]
    async fn asks_queued_behind_stop_are_rejected() {
        let ctx = ctx();
        let mut events = ctx.bus().subscribe();
        let engine = Engine::with_capacity(&ctx, "late", Capacity::Unbounded, ());
        let (release, gate) = oneshot::channel::<()>();

        engine
            .tell(|_| Box::pin(async move {
                let _ = gate.await;
            }))
            .await
            .expect("blocker");
        engine.request_stop().await.expect("stop");

        let late = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.ask_with(|_| 1).await })
        };
        tokio::task::yield_now().await;
        release.send(()).expect("release");

        assert_eq!(late.await.expect("join"), Err(EngineError::Closed));
        engine.stopped().await;

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert!(kinds.contains(&EventKind::EngineStopped));
    }

    #[tokio::test]
    async fn try_tell_reports_full_mailbox() {
        let engine = Engine::with_capacity(&ctx(), "tiny", Capacity::Rendezvous, ());
        let (release, gate) = oneshot::channel::<()>();
        let (started_tx, started) = oneshot::channel::<()>();

        engine
            .tell(|_| Box::pin(async move {
                let _ = started_tx.send(());
                let _ = gate.await;
            }))
            .await
            .expect("blocker");
        started.await.expect("worker busy");

        assert!(engine.try_tell(|_| Box::pin(async {})));
        assert_eq!(
            engine.try_send(|_| Box::pin(async {})),
            Err(EngineError::Full)
        );
        release.send(()).expect("release");
    }

    #[tokio::test]
    async fn tell_async_does_not_block_the_caller() {
        let engine = Engine::with_capacity(&ctx(), "async", Capacity::Rendezvous, 0_u32);
        let handles: Vec<_> = (0..10)
            .map(|_| engine.tell_async(|n| Box::pin(async move { *n += 1 })))
            .collect();
        for h in handles {
            h.await.expect("join").expect("accepted");
        }
        assert_eq!(engine.ask_with(|n| *n).await, Ok(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn posts_on_unbounded_mailbox_keep_call_order() {
        let engine = Engine::with_capacity(&ctx(), "posts", Capacity::Unbounded, Vec::new());
        for i in 0..100 {
            engine.post(move |v| Box::pin(async move { v.push(i) }));
        }
        let seen = engine.ask_with(|v| v.clone()).await.expect("ask");
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn cancelled_send_does_not_block_idle_detection() {
        let engine = Engine::with_capacity(&ctx(), "cancel", Capacity::Rendezvous, 0_u32);
        let (release, gate) = oneshot::channel::<()>();
        let (started_tx, started) = oneshot::channel::<()>();

        engine
            .tell(|_| Box::pin(async move {
                let _ = started_tx.send(());
                let _ = gate.await;
            }))
            .await
            .expect("blocker");
        started.await.expect("worker busy");
        engine.tell_with(|n| *n += 1).await.expect("fills the slot");

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), engine.tell_with(|n| *n += 100)).await;
        assert!(blocked.is_err(), "send waits while the mailbox is full");

        release.send(()).expect("release");
        tokio::time::timeout(
            Duration::from_secs(2),
            engine.wait_until_idle(|_| Box::pin(async {})),
        )
        .await
        .expect("idle is reached")
        .expect("engine open");
        assert_eq!(engine.ask_with(|n| *n).await, Ok(1));
    }

    #[tokio::test]
    async fn wait_until_idle_drains_follow_up_messages() {
        let engine = Engine::with_capacity(&ctx(), "idle", Capacity::Unbounded, 0_u32);
        for _ in 0..5 {
            let me = engine.clone();
            engine
                .tell_with(move |n| {
                    *n += 1;
                    let _ = me.try_tell(|n| Box::pin(async move { *n += 10 }));
                })
                .await
                .expect("tell");
        }

        let checks = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&checks);
        engine
            .wait_until_idle(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Box::pin(async {})
            })
            .await
            .expect("idle");
        assert!(checks.load(Ordering::SeqCst) >= 1);
        assert_eq!(engine.ask_with(|n| *n).await, Ok(55));
    }
}
