//! # Poller.
//!
//! ```text
//! loop:
//!   stop / token already fired? ──► Stopped / Aborted
//!   op(n) ─┬─ Ok(v), !should_continue(&v) ──► Ok(v)
//!          ├─ Err(e), !continue_on_error  ──► Operation { attempts: n, error: e }
//!          └─ otherwise: n == max_attempts ─► MaxAttempts
//!                        sleep(schedule.next(n-1)) racing stop and token
//! ```

mod config;
mod poller;

pub use config::PollConfig;
pub use poller::Poller;
