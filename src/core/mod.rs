//! Runtime core: serialized execution and scheduling.
//!
//! Internal modules:
//! - [`config`]: mailbox capacity and runtime settings;
//! - [`context`]: explicit scheduling context and its builder;
//! - [`engine`]: mailbox + worker loop executing one message at a time;
//! - [`handle`]: clonable completion handles for tracked tasks;
//! - [`mailbox`]: message variants and the channel flavours behind them.

mod config;
mod context;
mod engine;
mod handle;
mod mailbox;

pub use config::{Capacity, Config};
pub use context::{Context, ContextBuilder};
pub use engine::Engine;
pub use handle::TaskHandle;
