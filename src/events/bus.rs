//! # Event bus shared by everything built from one [`Context`](crate::Context).
//!
//! Engines, single-flight compute tasks, join rounds and cell timers all report
//! through the same [`Bus`]. Only the context's listener task ever subscribes; it
//! hands each event to the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ```text
//! engine worker ──┐
//! compute task  ──┼──► Bus (broadcast ring) ──► context listener ──► SubscriberSet
//! join round    ──┤
//! cell timer    ──┘
//! ```
//!
//! Publishing never waits. A context built without subscribers has no listener,
//! so its events are dropped on the spot. A listener that falls more than the
//! ring size behind loses the oldest events and logs how many it skipped.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus whose ring holds `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes `ev` to current receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        if self.tx.send(ev).is_err() {
            tracing::trace!("event dropped, no listener");
        }
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}
