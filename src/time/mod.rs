//! Time sources: the [`Clock`] trait, [`WallClock`] and the test-driven [`VirtualClock`].

mod clock;
mod virtual_clock;

pub use clock::{Clock, Delay, Tick, WallClock};
pub use virtual_clock::VirtualClock;
