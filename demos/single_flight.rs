//! # Example: single_flight
//!
//! Ten concurrent requests for the same key share one slow computation; a
//! panicking computation fails every requester of its key without touching the
//! others.
//!
//! Shows how to:
//! - Attach the built-in [`LogWriter`] through [`Context::builder`].
//! - Use [`SingleFlight::get_value`], [`SingleFlight::launch`] and [`SingleFlight::all`].
//!
//! ## Flow
//! ```text
//! 10 × get_value(7) ──► engine ──► first: spawn compute, others: attach
//!                                       │
//!        compute done ──► engine: Done(13), notify 10 listeners
//!
//! get_value(13) ──► compute panics ──► Failed ──► ComputeFailed event ──► LogWriter
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example single_flight --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use coact::{Config, Context, FlightError, LogWriter, SingleFlight, Subscribe};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let ctx = Context::builder(Config::default())
        .with_subscribers(subs)
        .build();

    let map: SingleFlight<u32, u32> = SingleFlight::new(&ctx, "demo");
    let runs = Arc::new(AtomicUsize::new(0));

    let mut requests = Vec::new();
    for _ in 0..10 {
        let map = map.clone();
        let runs = Arc::clone(&runs);
        requests.push(tokio::spawn(async move {
            map.get_value(7, move |k| async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                k + 6
            })
            .await
        }));
    }
    for r in requests {
        println!("[demo] got {:?}", r.await?);
    }
    println!("[demo] computations run: {}", runs.load(Ordering::SeqCst));

    let broken = map
        .get_value(13, |k| async move {
            if k == 13 {
                panic!("unlucky key");
            }
            k
        })
        .await;
    if let Err(FlightError::Failed { reason }) = &broken {
        println!("[demo] key 13 failed: {reason}");
    }

    for k in 0..3 {
        map.launch(k, |k| async move { k * 100 }, move |v| async move {
            println!("[demo] launched key {k} -> {v}");
        });
    }
    let mut all = map.all().await?;
    all.sort_unstable();
    println!("[demo] all values: {all:?}");

    // Give the subscriber worker a moment to print before shutting down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    ctx.shutdown();
    Ok(())
}
