//! # Rescheduler: at most one delayed follow-up change per cell.
//!
//! After every applied change the rescheduler looks at the new value:
//!
//! ```text
//!            change applied
//!                  │
//!          cancel pending timer ──► TimerCancelled
//!                  │
//!       is_to_call(value)? ── no ──► IDLE
//!                  │ yes
//!       next_time(value)?  ── None ─► IDLE
//!                  │ Some(target)
//!       clock.delay_until(target)
//!           ├─ AlreadyPast ──► warn, TimerSkipped, IDLE
//!           └─ In(delay)   ──► spawn sleep(delay), TimerArmed, ARMED
//!
//! ARMED ── sleep done ──► engine: token still live? ── yes ──► apply elapsed(value, target)
//!                                                   └─ no ───► ignore
//! ```
//!
//! The liveness check runs inside the cell's engine, in the same serialized
//! order as changes: a timer superseded by a change can never apply its
//! transform, even if its sleep finished in the meantime.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cell::actor_cell::ActorCell;
use crate::events::{Event, EventKind};
use crate::time::{Clock, Delay, Tick};

/// A value that knows when it wants to be revisited.
///
/// # Example
/// ```
/// use coact::{TimeTriggered, Tick};
///
/// #[derive(Clone)]
/// struct Lease { expires: Option<Tick>, expired: bool }
///
/// impl TimeTriggered for Lease {
///     fn next_time(&self) -> Option<Tick> {
///         self.expires
///     }
///     fn time_elapsed(&self, _tick: Tick) -> Self {
///         Lease { expires: None, expired: true }
///     }
/// }
/// ```
pub trait TimeTriggered {
    /// Tick at which [`time_elapsed`](Self::time_elapsed) should run, if any.
    fn next_time(&self) -> Option<Tick>;

    /// The value after `tick` was reached.
    fn time_elapsed(&self, tick: Tick) -> Self
    where
        Self: Sized;

    /// `false` suppresses arming for this value.
    fn is_to_call(&self) -> bool {
        true
    }
}

type NextTime<T> = Arc<dyn Fn(&T) -> Option<Tick> + Send + Sync>;
type Elapsed<T> = Arc<dyn Fn(&T, Tick) -> T + Send + Sync>;
type Condition<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct Timer {
    token: CancellationToken,
    tick: Tick,
}

/// Timer policy attached to an [`ActorCell`].
pub struct Rescheduler<T> {
    clock: Arc<dyn Clock>,
    next_time: NextTime<T>,
    elapsed: Elapsed<T>,
    is_to_call: Condition<T>,
    timer: Option<Timer>,
}

impl<T> Rescheduler<T> {
    /// Rescheduler driven by closures.
    pub fn new<C, N, E>(clock: C, next_time: N, elapsed: E) -> Self
    where
        C: Clock,
        N: Fn(&T) -> Option<Tick> + Send + Sync + 'static,
        E: Fn(&T, Tick) -> T + Send + Sync + 'static,
    {
        Self {
            clock: Arc::new(clock),
            next_time: Arc::new(next_time),
            elapsed: Arc::new(elapsed),
            is_to_call: Arc::new(|_: &T| true),
            timer: None,
        }
    }

    /// Rescheduler for values implementing [`TimeTriggered`].
    pub fn triggered<C: Clock>(clock: C) -> Self
    where
        T: TimeTriggered + 'static,
    {
        Self::new(clock, T::next_time, T::time_elapsed).with_condition(T::is_to_call)
    }

    /// Only arms for values satisfying `is_to_call`.
    pub fn with_condition<P>(mut self, is_to_call: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.is_to_call = Arc::new(is_to_call);
        self
    }

    /// True while a timer is pending.
    pub fn is_armed(&self) -> bool {
        self.timer
            .as_ref()
            .is_some_and(|timer| !timer.token.is_cancelled())
    }
}

impl<T: Send + 'static> Rescheduler<T> {
    /// Cancels the pending timer and arms one for `value` if it asks for it.
    pub(crate) fn after_change(&mut self, value: &T, cell: &ActorCell<T>) {
        if let Some(timer) = self.timer.take() {
            timer.token.cancel();
            cell.publish(Event::new(EventKind::TimerCancelled).with_tick(timer.tick));
        }
        if !(self.is_to_call)(value) {
            return;
        }
        let Some(target) = (self.next_time)(value) else {
            return;
        };

        match self.clock.delay_until(target) {
            Delay::AlreadyPast => {
                tracing::warn!(
                    cell = %cell.name(),
                    target,
                    now = self.clock.current_time(),
                    "timer target already past, not armed"
                );
                cell.publish(Event::new(EventKind::TimerSkipped).with_tick(target));
            }
            Delay::In(delay) => {
                let token = cell.context().child_token();
                cell.spawn_timer(Arc::clone(&self.clock), token.clone(), target, delay);
                self.timer = Some(Timer {
                    token,
                    tick: target,
                });
                cell.publish(
                    Event::new(EventKind::TimerArmed)
                        .with_tick(target)
                        .with_delay(delay),
                );
            }
        }
    }

    /// Claims the timer identified by `token` for firing.
    ///
    /// Returns the transform to apply, or `None` if the timer was superseded.
    pub(crate) fn claim(&mut self, token: &CancellationToken) -> Option<Elapsed<T>> {
        if token.is_cancelled() {
            return None;
        }
        self.timer.take()?;
        Some(Arc::clone(&self.elapsed))
    }
}
