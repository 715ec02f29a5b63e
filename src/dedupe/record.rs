use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DedupeError;

/// The single invocation every subscriber of a key awaits.
pub(super) type SharedCall<T, E> = Shared<BoxFuture<'static, Result<T, DedupeError<E>>>>;

/// One in-flight invocation.
pub(super) struct Record<T, E> {
    pub(super) call: SharedCall<T, E>,
    pub(super) created_at: Instant,
    pub(super) subscribers: usize,
    pub(super) token: CancellationToken,
    /// Only the invocation that created this record may remove it.
    pub(super) generation: u64,
}

impl<T, E> Record<T, E> {
    pub(super) fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// True if new callers may still join.
    pub(super) fn accepts_subscribers(
        &self,
        now: Instant,
        max_age: Option<Duration>,
        timeout: Option<Duration>,
    ) -> bool {
        let age = self.age(now);
        !max_age.is_some_and(|limit| age > limit) && !timeout.is_some_and(|limit| age > limit)
    }
}
