//! # Example: priority_queue
//!
//! Runs jobs through a [`TaskQueue`] with two slots. Urgent jobs jump ahead of the
//! pending backlog, a failing job does not stop the queue, and `clear()` drops what
//! has not started yet.
//!
//! ## Flow
//! ```text
//! add(job-0..3, prio 0) ──► slots: [job-0, job-1], pending: [job-2, job-3]
//! add(urgent, prio 10)  ──► pending: [urgent, job-2, job-3]
//! job-0 done            ──► urgent starts
//! ...
//! on_drain()            ──► stats: completed / errors / total
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example priority_queue
//! ```

use std::time::Duration;

use corral::{QueueConfig, QueueError, TaskQueueBuilder};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let queue = TaskQueueBuilder::new(QueueConfig::with_concurrency(2))
        .on_error(|err: &QueueError<String>| {
            println!("[queue] job failed: {err}");
            Ok(())
        })
        .build::<String>();

    let mut handles = Vec::new();
    for i in 0..4u64 {
        handles.push(queue.add(move || async move {
            println!("[job-{i}] start");
            tokio::time::sleep(Duration::from_millis(50 + i * 10)).await;
            if i == 2 {
                return Err(format!("job-{i} hit a bad record"));
            }
            println!("[job-{i}] done");
            Ok(format!("job-{i}"))
        }));
    }

    let urgent = queue.add_with_priority(
        || async {
            println!("[urgent] start");
            Ok("urgent".to_string())
        },
        10,
    );
    println!("[main] pending={} active={}", queue.size(), queue.active_count());

    println!("[main] urgent -> {:?}", urgent.await);
    for handle in handles {
        println!("[main] job -> {:?}", handle.await);
    }

    queue.pause();
    let parked = queue.add(|| async { Ok("never runs".to_string()) });
    queue.clear();
    println!("[main] parked -> {:?}", parked.await);
    queue.resume();

    queue.on_drain().await;
    let stats = queue.stats();
    println!(
        "[main] completed={} errors={} total={}",
        stats.completed, stats.errors, stats.total
    );
    Ok(())
}
