//! # Mailbox: the FIFO queue in front of one engine worker.
//!
//! Messages are a tagged variant holding an opaque body; the worker never looks
//! inside a body, it only decides how failures are reported:
//!
//! ```text
//! Run(body)            fire-and-forget; a panic is reported on the bus
//! RunWithResult(body)  the body carries its own reply sink; a panic goes there
//! Stop                 poison pill; closes the mailbox once processed
//! ```
//!
//! Bounded and rendezvous mailboxes sit on `tokio::sync::mpsc::channel`, unbounded
//! ones on `mpsc::unbounded_channel`.

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::core::config::Capacity;
use crate::error::EngineError;

/// Type-erased message body operating on the engine-owned state.
pub(crate) type Job<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send>;

/// Boxes a body closure.
///
/// Closures handed to this function get their higher-ranked signature inferred
/// from the bound, which `Box::new` alone cannot do.
pub(crate) fn job<S, F>(f: F) -> Job<S>
where
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// One queued unit of work.
pub(crate) enum Message<S> {
    Run(Job<S>),
    RunWithResult(Job<S>),
    Stop,
}

/// Sending half of a mailbox.
pub(crate) enum MailboxSender<S> {
    Bounded(mpsc::Sender<Message<S>>),
    Unbounded(mpsc::UnboundedSender<Message<S>>),
}

impl<S> Clone for MailboxSender<S> {
    fn clone(&self) -> Self {
        match self {
            MailboxSender::Bounded(tx) => MailboxSender::Bounded(tx.clone()),
            MailboxSender::Unbounded(tx) => MailboxSender::Unbounded(tx.clone()),
        }
    }
}

impl<S> MailboxSender<S> {
    /// Enqueues, waiting for room if the mailbox is bounded and full.
    pub(crate) async fn send(&self, msg: Message<S>) -> Result<(), EngineError> {
        match self {
            MailboxSender::Bounded(tx) => tx.send(msg).await.map_err(|_| EngineError::Closed),
            MailboxSender::Unbounded(tx) => tx.send(msg).map_err(|_| EngineError::Closed),
        }
    }

    pub(crate) fn is_unbounded(&self) -> bool {
        matches!(self, MailboxSender::Unbounded(_))
    }

    /// Enqueues without waiting.
    pub(crate) fn try_send(&self, msg: Message<S>) -> Result<(), EngineError> {
        match self {
            MailboxSender::Bounded(tx) => tx.try_send(msg).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => EngineError::Full,
                mpsc::error::TrySendError::Closed(_) => EngineError::Closed,
            }),
            MailboxSender::Unbounded(tx) => tx.send(msg).map_err(|_| EngineError::Closed),
        }
    }
}

/// Receiving half of a mailbox, owned by the worker.
pub(crate) enum MailboxReceiver<S> {
    Bounded(mpsc::Receiver<Message<S>>),
    Unbounded(mpsc::UnboundedReceiver<Message<S>>),
}

impl<S> MailboxReceiver<S> {
    pub(crate) async fn recv(&mut self) -> Option<Message<S>> {
        match self {
            MailboxReceiver::Bounded(rx) => rx.recv().await,
            MailboxReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    pub(crate) fn try_recv(&mut self) -> Option<Message<S>> {
        match self {
            MailboxReceiver::Bounded(rx) => rx.try_recv().ok(),
            MailboxReceiver::Unbounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Refuses further sends; already buffered messages stay receivable.
    pub(crate) fn close(&mut self) {
        match self {
            MailboxReceiver::Bounded(rx) => rx.close(),
            MailboxReceiver::Unbounded(rx) => rx.close(),
        }
    }
}

/// Creates a mailbox of the given capacity.
pub(crate) fn mailbox<S>(capacity: Capacity) -> (MailboxSender<S>, MailboxReceiver<S>) {
    match capacity.buffer() {
        Some(n) => {
            let (tx, rx) = mpsc::channel(n);
            (MailboxSender::Bounded(tx), MailboxReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (MailboxSender::Unbounded(tx), MailboxReceiver::Unbounded(rx))
        }
    }
}
