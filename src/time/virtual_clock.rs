//! # Test-controlled clock.
//!
//! A [`VirtualClock`] only moves when [`advance`](VirtualClock::advance) is called.
//! It carries two independent wake paths:
//!
//! - **sleepers** (`Clock::sleep_until`) watch the tick counter and resolve once it
//!   reaches their target; every advance wakes all of them;
//! - **the step gate** (`await_next_tick`) holds a single permit. An advance with
//!   nobody waiting leaves the permit in place, so the next
//!   `await_next_tick` returns immediately instead of missing it. Several advances
//!   without a waiter collapse into one permit.
//!
//! ## Example
//! ```rust
//! use coact::{Clock, VirtualClock};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let clock = VirtualClock::new(500);
//!     let sleeper = {
//!         let clock = clock.clone();
//!         tokio::spawn(async move { clock.sleep(20).await })
//!     };
//!
//!     tokio::task::yield_now().await; // let the sleeper register
//!     clock.advance(20);
//!     sleeper.await.unwrap();
//!     assert_eq!(clock.current_time(), 520);
//!
//!     clock.await_next_tick().await; // permit left by the advance above
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, watch};

use crate::time::clock::{Clock, Tick};

struct Inner {
    now: watch::Sender<Tick>,
    step: Notify,
}

/// Monotonic tick counter advanced explicitly by tests.
#[derive(Clone)]
pub struct VirtualClock {
    inner: Arc<Inner>,
}

impl VirtualClock {
    /// Creates a clock reading `start`.
    pub fn new(start: Tick) -> Self {
        let (now, _) = watch::channel(start);
        Self {
            inner: Arc::new(Inner {
                now,
                step: Notify::new(),
            }),
        }
    }

    /// Moves time forward by `amount` ticks and wakes sleepers and the step gate.
    pub fn advance(&self, amount: Tick) {
        self.inner
            .now
            .send_modify(|now| *now = now.saturating_add(amount));
        self.inner.step.notify_one();
    }

    /// Moves time forward to `tick`; earlier ticks leave the clock unchanged.
    pub fn advance_to(&self, tick: Tick) {
        let now = self.current_time();
        if tick > now {
            self.advance(tick - now);
        }
    }

    /// Waits for the next [`advance`](Self::advance), or consumes the retained one.
    pub async fn await_next_tick(&self) {
        self.inner.step.notified().await;
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualClock")
            .field("now", &self.current_time())
            .finish()
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn current_time(&self) -> Tick {
        *self.inner.now.borrow()
    }

    async fn sleep_until(&self, target: Tick) {
        let mut rx = self.inner.now.subscribe();
        // The sender lives as long as `self`, so the wait cannot end in an error.
        let _ = rx.wait_for(|now| *now >= target).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::clock::Delay;
    use std::time::Duration;

    #[tokio::test]
    async fn advance_is_retained_without_a_waiter() {
        let clock = VirtualClock::new(0);
        clock.advance(1);
        clock.advance(1);

        tokio::time::timeout(Duration::from_millis(100), clock.await_next_tick())
            .await
            .expect("retained permit");
        assert_eq!(clock.current_time(), 2);

        let second = tokio::time::timeout(Duration::from_millis(20), clock.await_next_tick()).await;
        assert!(second.is_err(), "two advances collapse into one permit");
    }

    #[tokio::test]
    async fn sleepers_wake_only_at_their_target() {
        let clock = VirtualClock::new(100);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for ticks in [5_u64, 10] {
            let clock = clock.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                clock.sleep(ticks).await;
                let _ = tx.send(ticks);
            });
        }
        tokio::task::yield_now().await;

        clock.advance(5);
        assert_eq!(rx.recv().await, Some(5));
        assert!(rx.try_recv().is_err());

        clock.advance(5);
        assert_eq!(rx.recv().await, Some(10));
    }

    #[test]
    fn advance_to_never_goes_backwards() {
        let clock = VirtualClock::new(50);
        clock.advance_to(40);
        assert_eq!(clock.current_time(), 50);
        clock.advance_to(70);
        assert_eq!(clock.current_time(), 70);
        assert_eq!(clock.delay_until(60), Delay::AlreadyPast);
    }
}
