//! # Example: dedup
//!
//! Several workers ask for the same expensive lookup at once. One of them computes it, the
//! others receive its result; a passive observer waits without ever owning the key.
//!
//! ## Flow
//! ```text
//! worker-0 ──► start("thumbnail") ──► Owner ── sleep 200ms ──► finish(Ok(..))
//! worker-1..4 ─► start("thumbnail") ─► Waiter ─────────────────► same outcome
//! observer ──► wait_for("thumbnail") ──────────────────────────► same outcome
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=runlock=debug cargo run --example dedup
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use runlock::{RunLock, Slot};
use tracing_subscriber::EnvFilter;

type Lock = RunLock<&'static str, String, String>;

async fn render(lock: Lock, worker: usize, computed: Arc<AtomicUsize>) -> Result<String, String> {
    match lock.start("thumbnail") {
        Slot::Owner(mut finish) => {
            computed.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            let outcome = Ok(format!("rendered by worker-{worker}"));
            finish.finish(outcome).map_err(|e| e.to_string())
        }
        Slot::Waiter(wait) => wait.await.map_err(|e| e.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("runlock=debug")),
        )
        .init();

    let lock = Lock::new();
    let computed = Arc::new(AtomicUsize::new(0));

    let mut events = lock.subscribe();
    tokio::spawn(async move {
        while let Ok(ev) = events.recv().await {
            println!(
                "[{}] key={} listeners={:?}",
                ev.kind.as_label(),
                ev.key.as_deref().unwrap_or("-"),
                ev.listeners
            );
        }
    });

    let workers: Vec<_> = (0..5)
        .map(|i| tokio::spawn(render(lock.clone(), i, computed.clone())))
        .collect();

    // Give the owner a moment to register before observing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let observed = lock.wait_for("thumbnail").await?;
    println!("observer got: {observed:?}");

    for w in workers {
        println!("worker got: {:?}", w.await?);
    }
    println!("computed {} time(s)", computed.load(Ordering::SeqCst));

    // Nothing in flight now: returns the default immediately.
    let idle = lock.wait_for("thumbnail").await?;
    assert!(idle.is_empty());
    Ok(())
}
