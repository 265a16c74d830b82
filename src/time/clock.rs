//! # Time sources for the rescheduler.
//!
//! A [`Clock`] answers "what tick is it" and "wait until that tick". The
//! rescheduler only ever talks to the trait, so production code runs on
//! [`WallClock`] while tests swap in a [`VirtualClock`](crate::VirtualClock)
//! and drive time by hand.
//!
//! ## Delay computation
//! ```text
//! delay_until(target):
//!   target >= now  → Delay::In(target - now)   (0 means "fire on next poll")
//!   target <  now  → Delay::AlreadyPast        (caller skips arming entirely)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Abstract unit of time; milliseconds for [`WallClock`].
pub type Tick = u64;

/// Result of [`Clock::delay_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Ticks left until the target.
    In(Tick),
    /// The target lies before the current tick.
    AlreadyPast,
}

/// Substitutable time source.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Current tick.
    fn current_time(&self) -> Tick;

    /// Resolves once the clock reads `target` or later.
    async fn sleep_until(&self, target: Tick);

    /// Resolves once `ticks` ticks have passed on this clock.
    async fn sleep(&self, ticks: Tick) {
        let target = self.current_time().saturating_add(ticks);
        self.sleep_until(target).await;
    }

    /// Ticks from now until `target`, or [`Delay::AlreadyPast`].
    ///
    /// # Example
    /// ```
    /// use coact::{Clock, Delay, VirtualClock};
    ///
    /// let clock = VirtualClock::new(500);
    /// assert_eq!(clock.delay_until(520), Delay::In(20));
    /// assert_eq!(clock.delay_until(500), Delay::In(0));
    /// assert_eq!(clock.delay_until(499), Delay::AlreadyPast);
    /// ```
    fn delay_until(&self, target: Tick) -> Delay {
        match target.checked_sub(self.current_time()) {
            Some(ticks) => Delay::In(ticks),
            None => Delay::AlreadyPast,
        }
    }
}

/// Real time: one tick per `resolution` since the clock was created.
#[derive(Clone, Debug)]
pub struct WallClock {
    origin: Instant,
    resolution: Duration,
}

impl WallClock {
    /// Millisecond ticks starting at zero.
    pub fn new() -> Self {
        Self::with_resolution(Duration::from_millis(1))
    }

    /// Ticks of the given length; a zero resolution is raised to one millisecond.
    pub fn with_resolution(resolution: Duration) -> Self {
        let resolution = if resolution.is_zero() {
            Duration::from_millis(1)
        } else {
            resolution
        };
        Self {
            origin: Instant::now(),
            resolution,
        }
    }
}

impl WallClock {
    /// Instant at which the clock reads `target`, or `None` if it is not representable.
    fn deadline(&self, target: Tick) -> Option<Instant> {
        let nanos = self.resolution.as_nanos().checked_mul(u128::from(target))?;
        let offset = Duration::from_nanos(u64::try_from(nanos).ok()?);
        self.origin.checked_add(offset)
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for WallClock {
    fn current_time(&self) -> Tick {
        let elapsed = self.origin.elapsed().as_nanos() / self.resolution.as_nanos();
        Tick::try_from(elapsed).unwrap_or(Tick::MAX)
    }

    async fn sleep_until(&self, target: Tick) {
        match self.deadline(target) {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
