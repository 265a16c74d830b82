//! # Global configuration.
//!
//! Provides [`Config`] centralized settings for a [`Context`](crate::Context) and
//! [`Capacity`], the mailbox sizing of an engine.
//!
//! ## Sentinel values
//! - `Capacity::Bounded(0)` → treated as [`Capacity::Rendezvous`]
//! - `bus_capacity = 0` → clamped to 1

/// Mailbox sizing of an [`Engine`](crate::Engine).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Capacity {
    /// Hand-off mailbox: a sender waits while a previous message is still unclaimed.
    ///
    /// Realized as a one-slot buffer, since tokio channels need a non-zero capacity.
    #[default]
    Rendezvous,

    /// At most `n` queued messages; `tell` suspends while full.
    Bounded(usize),

    /// Never applies backpressure.
    Unbounded,
}

impl Capacity {
    /// Returns the buffer size for a bounded channel, or `None` for unbounded.
    ///
    /// # Example
    /// ```
    /// use coact::Capacity;
    ///
    /// assert_eq!(Capacity::Rendezvous.buffer(), Some(1));
    /// assert_eq!(Capacity::Bounded(0).buffer(), Some(1));
    /// assert_eq!(Capacity::Bounded(8).buffer(), Some(8));
    /// assert_eq!(Capacity::Unbounded.buffer(), None);
    /// ```
    #[inline]
    pub fn buffer(&self) -> Option<usize> {
        match *self {
            Capacity::Rendezvous => Some(1),
            Capacity::Bounded(n) => Some(n.max(1)),
            Capacity::Unbounded => None,
        }
    }
}

/// Global configuration shared through a [`Context`](crate::Context).
///
/// ## Field semantics
/// - `mailbox`: default capacity for engines created without an explicit one
/// - `bus_capacity`: event bus ring buffer size (min 1)
#[derive(Clone, Debug)]
pub struct Config {
    /// Default mailbox capacity.
    ///
    /// Single-flight maps, join sets, cells and start gates pick their own
    /// capacity; engines built with [`Engine::new`](crate::Engine::new) use this one.
    pub mailbox: Capacity,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `mailbox = Capacity::Rendezvous`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            mailbox: Capacity::Rendezvous,
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_capacity_is_clamped() {
        let cfg = Config {
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn default_mailbox_is_rendezvous() {
        assert_eq!(Config::default().mailbox, Capacity::Rendezvous);
        assert_eq!(Capacity::default(), Capacity::Rendezvous);
    }
}
