//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Engine` workers (failed bodies, stop), `SingleFlight` compute
//!   tasks, `JoinSet` rounds, `Rescheduler` timers, `SubscriberSet` workers.
//! - **Consumers**: the listener spawned by [`Context`](crate::Context), which fans
//!   out to the [`SubscriberSet`](crate::SubscriberSet).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
