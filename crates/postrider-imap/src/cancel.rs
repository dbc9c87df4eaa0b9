//! Cooperative cancellation.
//!
//! A [`CancelToken`] lets a user-facing caller interrupt a blocking
//! protocol exchange (typically from a signal handler) without racing
//! it: the drain loop polls the token at its suspension points, so a
//! cancel observed before a command is sent costs nothing, while one
//! observed later closes the link rather than leave the wire in an
//! unknown state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::{Error, Result};

/// Shared cancellation flag.
///
/// Cheap to clone; all clones observe the same state. Cancellation is
/// sticky: once fired, every subsequent check fails until the token is
/// discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Creates an unfired token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token, waking every task parked in
    /// [`cancelled`](Self::cancelled).
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves when the token fires; immediately if it already has.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register as a waiter before reading the flag: a cancel that
        // lands between the two then counts as a notification instead
        // of being missed until the next wakeup.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Errors with [`Error::Aborted`] if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Aborted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn starts_unfired() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_is_sticky_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();

        clone.cancel();

        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Aborted)));
        assert!(matches!(clone.check(), Err(Error::Aborted)));
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_fired() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
    }

    #[tokio::test]
    async fn cancel_between_creation_and_first_poll_resolves() {
        let token = CancelToken::new();
        let mut parked = tokio_test::task::spawn(token.cancelled());

        token.cancel();

        assert!(parked.poll().is_ready());
    }

    #[tokio::test]
    async fn parked_future_wakes_on_the_first_cancel() {
        let token = CancelToken::new();
        let mut parked = tokio_test::task::spawn(token.cancelled());
        assert!(parked.poll().is_pending());

        // notify_waiters wakes only registered waiters; the pending
        // poll above must have registered this one.
        token.cancel();

        assert!(parked.is_woken());
        assert!(parked.poll().is_ready());
    }

    #[tokio::test]
    async fn cancelled_wakes_a_parked_task() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        tokio::task::yield_now().await;
        token.cancel();

        assert!(handle.await.unwrap());
    }
}
