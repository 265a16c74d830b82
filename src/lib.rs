//! # coact
//!
//! **coact** coordinates access to shared mutable state and deduplicates
//! concurrent work without locks. Every piece of shared state is owned by one
//! [`Engine`]: a mailbox plus a worker task that runs queued messages strictly one
//! at a time. The other primitives are built on engines.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!  │ SingleFlight │ │   JoinSet    │ │  ActorCell   │ │  StartGate   │
//!  │ (per-key     │ │ (draining    │ │ + Rescheduler│ │ (deferred    │
//!  │  dedup)      │ │  join)       │ │  (timers)    │ │  actions)    │
//!  └──────┬───────┘ └──────┬───────┘ └──────┬───────┘ └──────┬───────┘
//!         ▼                ▼                ▼                ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Engine<S>: mailbox (rendezvous | bounded | unbounded) ──► worker   │
//! │  ask / tell / try_tell / tell_async / post / request_stop /         │
//! │  wait_until_idle                                                    │
//! └──────────────────────────────┬──────────────────────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Context: runtime handle, event Bus, Config, root cancellation      │
//! └──────────────────────────────┬──────────────────────────────────────┘
//!                                ▼
//!                     Bus (broadcast) ──► SubscriberSet ──► Subscribe impls
//! ```
//!
//! ### Message lifecycle
//! ```text
//! caller ──► is_open? ── no ──► EngineError::Closed
//!               │ yes
//!               ▼
//!         mailbox (FIFO) ──► worker ──► body(&mut state)
//!                                   ├─ Ok     ──► reply (ask) / nothing (tell)
//!                                   ├─ panic  ──► Panicked (ask) / MessageFailed event (tell)
//!                                   └─ Stop   ──► close, discard the rest, EngineStopped
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types / traits                                   |
//! |-------------------|------------------------------------------------------------------|------------------------------------------------------|
//! | **Engine**        | Serialized execution for one named owner.                        | [`Engine`], [`Capacity`]                             |
//! | **Single-flight** | Compute each key at most once; group maps; non-waiting writer.   | [`SingleFlight`], [`FlightCollection`], [`FlightWriter`] |
//! | **Join**          | Wait for an open-ended, self-extending set of tasks.             | [`JoinSet`], [`TaskHandle`]                          |
//! | **Cells**         | One value behind an engine, with timed follow-up changes.       | [`ActorCell`], [`Rescheduler`], [`TimeTriggered`], [`StartGate`] |
//! | **Time**          | Substitutable clocks; a hand-driven clock for tests.             | [`Clock`], [`WallClock`], [`VirtualClock`]           |
//! | **Subscriber API**| Observe runtime events (logging, metrics, custom subscribers).   | [`Subscribe`], [`Event`], [`EventKind`]              |
//! | **Errors**        | Typed errors for delivery and computation failures.              | [`EngineError`], [`FlightError`]                     |
//! | **Configuration** | Explicit scheduling context and settings.                        | [`Context`], [`Config`]                              |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use coact::{Config, Context, SingleFlight};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn coact::Subscribe>> = vec![Arc::new(coact::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn coact::Subscribe>> = Vec::new();
//!
//!     let ctx = Context::builder(Config::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let lengths: SingleFlight<String, usize> = SingleFlight::new(&ctx, "lengths");
//!     let n = lengths
//!         .get_value("hello".to_string(), |k| async move { k.len() })
//!         .await?;
//!     assert_eq!(n, 5);
//!
//!     ctx.shutdown();
//!     Ok(())
//! }
//! ```
mod cell;
mod core;
mod error;
mod events;
mod flight;
mod join;
mod subscribers;
mod time;

// ---- Public re-exports ----

pub use cell::{ActorCell, CellBuilder, Rescheduler, StartGate, TimeTriggered};
pub use crate::core::{Capacity, Config, Context, ContextBuilder, Engine, TaskHandle};
pub use error::{EngineError, FlightError};
pub use events::{Bus, Event, EventKind};
pub use flight::{FlightCollection, FlightWriter, SingleFlight};
pub use join::JoinSet;
pub use subscribers::{Subscribe, SubscriberSet};
pub use time::{Clock, Delay, Tick, VirtualClock, WallClock};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
