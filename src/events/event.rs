//! # Runtime events emitted by engines and the primitives built on them.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Engine events**: message failures, discarded messages, stop
//! - **Flight/join events**: failed computations, join rounds
//! - **Timer events**: rescheduler arm/skip/cancel/fire
//! - **Subscriber events**: overflow and panics inside subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the owner
//! name, reasons, and virtual-clock ticks.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use coact::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TimerArmed)
//!     .with_owner("cell")
//!     .with_tick(520)
//!     .with_delay(20);
//!
//! assert_eq!(ev.kind, EventKind::TimerArmed);
//! assert_eq!(ev.owner.as_deref(), Some("cell"));
//! assert_eq!(ev.delay, Some(20));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `owner`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `owner`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Engine events ===
    /// A fire-and-forget message body panicked; the worker loop kept running.
    ///
    /// Sets:
    /// - `owner`: engine name
    /// - `reason`: panic message
    MessageFailed,

    /// Messages queued behind the stop message were dropped.
    ///
    /// Sets:
    /// - `owner`: engine name
    /// - `count`: number of dropped messages
    MessagesDiscarded,

    /// The engine processed its stop message and closed its mailbox.
    ///
    /// Sets:
    /// - `owner`: engine name
    EngineStopped,

    // === Flight / join events ===
    /// A single-flight computation panicked; the entry is now failed.
    ///
    /// Sets:
    /// - `owner`: map name
    /// - `reason`: panic message
    ComputeFailed,

    /// A join round took a snapshot of tracked tasks.
    ///
    /// Sets:
    /// - `owner`: join set name
    /// - `count`: snapshot size
    JoinRoundStarted,

    /// A join round found nothing new and released all waiters.
    ///
    /// Sets:
    /// - `owner`: join set name
    /// - `count`: number of released waiters
    JoinRoundFinished,

    // === Timer events ===
    /// The rescheduler armed a timer.
    ///
    /// Sets:
    /// - `owner`: cell name
    /// - `tick`: target tick
    /// - `delay`: ticks until firing
    TimerArmed,

    /// The requested tick was already in the past; nothing was armed.
    ///
    /// Sets:
    /// - `owner`: cell name
    /// - `tick`: requested tick
    TimerSkipped,

    /// A pending timer was cancelled by a newer change.
    ///
    /// Sets:
    /// - `owner`: cell name
    TimerCancelled,

    /// A timer fired and its transform was applied.
    ///
    /// Sets:
    /// - `owner`: cell name
    /// - `tick`: target tick
    TimerFired,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the emitting engine, cell, map or subscriber.
    pub owner: Option<Arc<str>>,
    /// Human-readable reason (panic messages, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Clock tick the event refers to.
    pub tick: Option<u64>,
    /// Delay in clock ticks.
    pub delay: Option<u64>,
    /// Item count (discarded messages, snapshot size, released waiters).
    pub count: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            owner: None,
            reason: None,
            tick: None,
            delay: None,
            count: None,
        }
    }

    /// Attaches the owner name.
    #[inline]
    pub fn with_owner(mut self, owner: impl Into<Arc<str>>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a clock tick.
    #[inline]
    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Attaches a delay in ticks.
    #[inline]
    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Attaches an item count.
    #[inline]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_owner(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_owner(subscriber)
            .with_reason(info)
    }

    /// True for overflow reports, which the fan-out never re-publishes.
    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}
