//! # Bounded retry with backoff.
//!
//! ```text
//! attempt(n) ─► Ok ──────────────────────────────► Ok(value)
//!     │
//!     └─► Err ─► n > retries or !should_retry ──► Exhausted { attempts, error }
//!            └─► on_retry hook ─► sleep(backoff.next(n-1)) ─► attempt(n+1)
//!
//! token.cancelled() races every attempt and every sleep ──► Aborted { attempts }
//! ```

mod config;
mod runner;

pub use config::RetryConfig;
pub use runner::run;
