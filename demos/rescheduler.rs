//! # Example: rescheduler
//!
//! A lease that expires at a fixed tick. Renewing it before expiry cancels the
//! pending timer and arms a new one; letting the clock pass the deadline applies
//! the expiry transform exactly once.
//!
//! Shows how to:
//! - Implement [`TimeTriggered`] for a value type.
//! - Drive an [`ActorCell`] with a [`VirtualClock`] step by step.
//! - Watch timer events with a custom [`Subscribe`] implementation.
//!
//! ## Run
//! ```bash
//! cargo run --example rescheduler
//! ```

use std::sync::Arc;

use coact::{
    ActorCell, Config, Context, Event, EventKind, Rescheduler, Subscribe, Tick, TimeTriggered,
    VirtualClock,
};

#[derive(Clone, Debug)]
struct Lease {
    holder: &'static str,
    expires: Option<Tick>,
}

impl TimeTriggered for Lease {
    fn next_time(&self) -> Option<Tick> {
        self.expires
    }

    fn time_elapsed(&self, tick: Tick) -> Self {
        println!("[lease] {} expired at tick {tick}", self.holder);
        Lease {
            holder: "nobody",
            expires: None,
        }
    }
}

struct TimerPrinter;

#[async_trait::async_trait]
impl Subscribe for TimerPrinter {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::TimerArmed => println!(
                "[sub] armed:     tick={} delay={}",
                ev.tick.unwrap_or_default(),
                ev.delay.unwrap_or_default()
            ),
            EventKind::TimerCancelled => {
                println!("[sub] cancelled: tick={}", ev.tick.unwrap_or_default())
            }
            EventKind::TimerFired => println!("[sub] fired:     tick={}", ev.tick.unwrap_or_default()),
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "timer-printer"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(TimerPrinter)];
    let ctx = Context::builder(Config::default())
        .with_subscribers(subs)
        .build();
    let clock = VirtualClock::new(500);

    let lease = ActorCell::builder(
        "lease",
        Lease {
            holder: "alice",
            expires: Some(520),
        },
    )
    .rescheduler(Rescheduler::triggered(clock.clone()))
    .on_every_change(|l: &Lease| println!("[lease] now {l:?}"))
    .build(&ctx);

    clock.advance(10);
    lease
        .change_and_await(|l| Lease {
            expires: Some(540),
            ..l.clone()
        })
        .await?;
    println!("[demo] renewed at tick 510, armed: {}", lease.is_armed().await?);

    clock.advance(30);
    while lease.is_armed().await? {
        tokio::task::yield_now().await;
    }
    println!("[demo] final: {:?}", lease.read_await().await?);

    lease.stop().await?;
    lease.stopped().await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    ctx.shutdown();
    Ok(())
}
