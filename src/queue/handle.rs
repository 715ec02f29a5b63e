use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::QueueError;

/// Future for the outcome of one queued task.
///
/// Settles exactly once with the operation's result, its error
/// ([`QueueError::Operation`]), or a structural condition (`Cleared`, `Aborted`,
/// `Timeout`, `Panicked`). Dropping the handle does not cancel the task.
#[must_use = "dropping a TaskHandle discards the task's outcome"]
pub struct TaskHandle<T, E> {
    state: HandleState<T, E>,
}

enum HandleState<T, E> {
    Ready(Option<Result<T, QueueError<E>>>),
    Waiting(oneshot::Receiver<Result<T, QueueError<E>>>),
}

impl<T, E> TaskHandle<T, E> {
    pub(super) fn ready(outcome: Result<T, QueueError<E>>) -> Self {
        Self {
            state: HandleState::Ready(Some(outcome)),
        }
    }

    pub(super) fn waiting(rx: oneshot::Receiver<Result<T, QueueError<E>>>) -> Self {
        Self {
            state: HandleState::Waiting(rx),
        }
    }
}

impl<T, E> Unpin for TaskHandle<T, E> {}

impl<T, E> std::fmt::Debug for TaskHandle<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            HandleState::Ready(Some(_)) => "ready",
            HandleState::Ready(None) => "consumed",
            HandleState::Waiting(_) => "waiting",
        };
        f.debug_struct("TaskHandle").field("state", &state).finish()
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, QueueError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            HandleState::Ready(outcome) => match outcome.take() {
                Some(outcome) => Poll::Ready(outcome),
                None => panic!("TaskHandle polled after completion"),
            },
            // A dropped sender means the queue went away with the task still pending.
            HandleState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|res| res.unwrap_or_else(|_| Err(QueueError::Aborted))),
        }
    }
}
