//! # Observer hooks and failure isolation.
//!
//! Components accept optional observer callbacks (`on_error`, `on_retry`, `on_evict`).
//! A hook may fail by returning `Err` or by panicking; either way the failure is caught
//! here and logged at `warn` level. It never changes component state and never reaches
//! the caller's future.
//!
//! ```text
//! component ──► invoke(component, hook, || user_hook(arg))
//!                   ├─ Ok(())  → nothing
//!                   ├─ Err(e)  → warn!(component, hook, error = e)
//!                   └─ panic   → warn!(component, hook, panic = msg)
//! ```

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Error a hook may return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result a hook returns.
pub type HookResult = Result<(), HookError>;

/// Runs a hook, swallowing and logging any failure.
pub(crate) fn invoke<F>(component: &'static str, hook: &'static str, f: F)
where
    F: FnOnce() -> HookResult,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(component, hook, error = %err, "hook returned an error");
        }
        Err(payload) => {
            tracing::warn!(
                component,
                hook,
                panic = %panic_message(payload.as_ref()),
                "hook panicked"
            );
        }
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_failures_are_swallowed() {
        let calls = AtomicUsize::new(0);
        invoke("test", "on_error", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("hook exploded".into())
        });
        invoke("test", "on_error", || {
            calls.fetch_add(1, Ordering::SeqCst);
            panic!("hook panicked");
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panic_message_variants() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
