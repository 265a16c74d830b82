//! # LogWriter: simple event printer
//!
//! A minimal subscriber that prints incoming [`Event`]s to stdout.
//! Use it for test or demo.
//!
//! ## Example output
//! ```text
//! [message-failed] owner="counter" err="boom"
//! [timer-armed] owner="cell" tick=520 delay=20
//! [timer-cancelled] owner="cell"
//! [join-round] owner="jobs" snapshot=3
//! [engine-stopped] owner="counter"
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let owner = e.owner.as_deref().unwrap_or("unknown");
        match e.kind {
            EventKind::MessageFailed => {
                println!("[message-failed] owner={owner:?} err={:?}", e.reason);
            }
            EventKind::MessagesDiscarded => {
                println!("[messages-discarded] owner={owner:?} count={:?}", e.count);
            }
            EventKind::EngineStopped => {
                println!("[engine-stopped] owner={owner:?}");
            }
            EventKind::ComputeFailed => {
                println!("[compute-failed] owner={owner:?} err={:?}", e.reason);
            }
            EventKind::JoinRoundStarted => {
                println!("[join-round] owner={owner:?} snapshot={:?}", e.count);
            }
            EventKind::JoinRoundFinished => {
                println!("[join-done] owner={owner:?} released={:?}", e.count);
            }
            EventKind::TimerArmed => {
                println!(
                    "[timer-armed] owner={owner:?} tick={:?} delay={:?}",
                    e.tick, e.delay
                );
            }
            EventKind::TimerSkipped => {
                println!("[timer-skipped] owner={owner:?} tick={:?}", e.tick);
            }
            EventKind::TimerCancelled => {
                println!("[timer-cancelled] owner={owner:?}");
            }
            EventKind::TimerFired => {
                println!("[timer-fired] owner={owner:?} tick={:?}", e.tick);
            }
            EventKind::SubscriberOverflow => {
                println!("[subscriber-overflow] subscriber={owner} reason={:?}", e.reason);
            }
            EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber-panicked] subscriber={owner} info={}",
                    e.reason.as_deref().unwrap_or("unknown"),
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
