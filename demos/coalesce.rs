//! # Example: coalesce
//!
//! Ten concurrent lookups for the same user reach the backend once through a
//! [`Dedupe`], and the result is memoized with stale-while-revalidate.
//!
//! ## Flow
//! ```text
//! 10 × call(user 7) ──► key "users:7" ──► one fetch ──► 10 × same result
//! Memoized::get(7)  ──► miss ──► fetch ──► cached (ttl 200ms)
//!          (later)  ──► stale ──► served now, refreshed in background
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example coalesce
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use corral::{CacheConfig, Dedupe, DedupeConfig, ErrorSnapshot, Memoized};
use futures::future::join_all;

static BACKEND_CALLS: AtomicUsize = AtomicUsize::new(0);

async fn fetch_user(id: u32) -> Result<String, ErrorSnapshot> {
    let n = BACKEND_CALLS.fetch_add(1, Ordering::SeqCst) + 1;
    println!("[backend] fetch user {id} (call #{n})");
    tokio::time::sleep(Duration::from_millis(100)).await;
    if id == 0 {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no user 0");
        return Err(ErrorSnapshot::capture(&err).with_property("id", id));
    }
    Ok(format!("user-{id} (v{n})"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let users = Dedupe::new(
        DedupeConfig {
            prefix: Some("users".into()),
            max_age: Duration::from_secs(5),
            ..DedupeConfig::default()
        },
        fetch_user,
    );

    let calls: Vec<_> = (0..10).map(|_| users.call(7)).collect();
    println!(
        "[main] in flight: {:?}, subscribers: {:?}",
        users.in_progress_keys(),
        users.subscriber_count("users:7")
    );
    for res in join_all(calls).await {
        println!("[main] got {:?}", res);
    }

    if let Err(err) = users.call(0).await {
        println!("[main] lookup failed: {err} ({})", err.as_label());
    }

    let shared = users.clone();
    let cached = Memoized::new(
        CacheConfig {
            ttl: Duration::from_millis(200),
            stale_while_revalidate: true,
            ..CacheConfig::default()
        },
        move |id: u32| shared.call(id),
    );

    println!("[memo] {:?}", cached.get(7).await);
    println!("[memo] {:?} (cached)", cached.get(7).await);
    tokio::time::sleep(Duration::from_millis(250)).await;
    println!("[memo] {:?} (stale, refreshing)", cached.get(7).await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    println!("[memo] {:?} (refreshed)", cached.get(7).await);

    println!("[main] backend calls: {}", BACKEND_CALLS.load(Ordering::SeqCst));
    Ok(())
}
