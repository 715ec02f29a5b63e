//! # Idle signals (`on_empty` / `on_drain`).
//!
//! Each signal is a tiny state machine:
//!
//! ```text
//!            wait() while condition false
//!  Unarmed ───────────────────────────────► Armed { tx, shared rx }
//!     ▲                                          │
//!     └──────────── fire() (tx.send) ◄───────────┘
//! ```
//!
//! All callers that wait during one armed period share one receiver, so a single
//! transition resolves all of them exactly once. When the condition already holds the
//! queue hands out [`Idle::ready`] and the signal stays unarmed.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::Shared;
use tokio::sync::oneshot;

#[derive(Default)]
pub(super) enum IdleSignal {
    #[default]
    Unarmed,
    Armed {
        tx: oneshot::Sender<()>,
        rx: Shared<oneshot::Receiver<()>>,
    },
}

impl IdleSignal {
    /// Returns a waiter, arming the signal if needed.
    pub(super) fn wait(&mut self) -> Idle {
        if let IdleSignal::Armed { rx, .. } = self {
            return Idle::waiting(rx.clone());
        }
        let (tx, rx) = oneshot::channel();
        let rx = rx.shared();
        let idle = Idle::waiting(rx.clone());
        *self = IdleSignal::Armed { tx, rx };
        idle
    }

    /// Resolves every waiter and disarms. Returns `false` if nothing was armed.
    pub(super) fn fire(&mut self) -> bool {
        match std::mem::take(self) {
            IdleSignal::Armed { tx, .. } => {
                let _ = tx.send(());
                true
            }
            IdleSignal::Unarmed => false,
        }
    }

    #[cfg(test)]
    pub(super) fn is_armed(&self) -> bool {
        matches!(self, IdleSignal::Armed { .. })
    }
}

/// Future returned by [`TaskQueue::on_empty`](crate::TaskQueue::on_empty) and
/// [`TaskQueue::on_drain`](crate::TaskQueue::on_drain).
///
/// Also resolves if the queue is dropped while waiting.
#[must_use = "futures do nothing unless awaited"]
pub struct Idle {
    rx: Option<Shared<oneshot::Receiver<()>>>,
}

impl Idle {
    pub(super) fn ready() -> Self {
        Self { rx: None }
    }

    fn waiting(rx: Shared<oneshot::Receiver<()>>) -> Self {
        Self { rx: Some(rx) }
    }

    /// True if the condition already held when this future was created.
    pub fn is_ready(&self) -> bool {
        self.rx.is_none()
    }
}

impl std::fmt::Debug for Idle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Idle").field("ready", &self.is_ready()).finish()
    }
}

impl Future for Idle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.rx.as_mut() {
            None => Poll::Ready(()),
            Some(rx) => rx.poll_unpin(cx).map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_resolves_all_waiters_once() {
        let mut signal = IdleSignal::default();
        let a = signal.wait();
        let b = signal.wait();
        assert!(signal.is_armed());

        assert!(signal.fire());
        assert!(!signal.is_armed());
        assert!(!signal.fire(), "second fire must be a no-op");

        assert_eq!(a.now_or_never(), Some(()));
        assert_eq!(b.now_or_never(), Some(()));
    }

    #[test]
    fn test_rearms_after_fire() {
        let mut signal = IdleSignal::default();
        let _first = signal.wait();
        signal.fire();

        let mut next = signal.wait();
        assert!(signal.is_armed());
        assert_eq!((&mut next).now_or_never(), None);
        signal.fire();
        assert_eq!(next.now_or_never(), Some(()));
    }

    #[test]
    fn test_ready_needs_no_signal() {
        let idle = Idle::ready();
        assert!(idle.is_ready());
        assert_eq!(idle.now_or_never(), Some(()));
    }
}
