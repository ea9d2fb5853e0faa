//! Run context handed to every dependency body
//!
//! The executor threads a [`RunContext`] through to each action but never
//! interprets it; honouring cancellation is up to the action itself.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle carrying the cancellation signal for one run
#[derive(Clone, Debug)]
pub struct RunContext {
    cancelled: Arc<watch::Sender<bool>>,
}

impl Default for RunContext {
    fn default() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            cancelled: Arc::new(sender),
        }
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this context.
    ///
    /// Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Wait until [`RunContext::cancel`] has been called on any clone
    pub async fn cancelled(&self) {
        let mut receiver = self.cancelled.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_new_context_is_not_cancelled() {
        assert!(!RunContext::new().is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_from_clones() {
        let ctx = RunContext::new();
        let clone = ctx.clone();
        clone.cancel();
        clone.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let ctx = RunContext::new();
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be released")
            .expect("waiter task should not panic");
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let ctx = RunContext::new();
        ctx.cancel();
        tokio::time::timeout(Duration::from_secs(1), ctx.cancelled())
            .await
            .expect("already-cancelled context should not block");
    }
}
