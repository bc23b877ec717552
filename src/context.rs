//! Per-request cancellation and deadline signal.
//!
//! Every remote call made on behalf of a request takes a `RequestContext` and
//! races its I/O against [`RequestContext::done`].

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{sync::watch, time::Instant};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("request cancelled")]
    Cancelled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    cancel: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled unless asked to and has no deadline.
    pub fn background() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            cancel: Arc::new(tx),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let mut ctx = Self::background();
        ctx.deadline = Some(Instant::now() + timeout);
        ctx
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Reports why the context is already finished, if it is.
    pub fn err(&self) -> Option<ContextError> {
        if self.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        let mut rx = self.cancel.subscribe();
        let cancelled = async move {
            // The sender lives as long as `self`, so this only returns on cancel.
            let _ = rx.wait_for(|c| *c).await;
        };
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = cancelled => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                ContextError::Cancelled
            }
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_seen_by_clones() {
        let ctx = RequestContext::background();
        let clone = ctx.clone();
        assert_eq!(clone.err(), None);
        ctx.cancel();
        assert_eq!(clone.err(), Some(ContextError::Cancelled));
        assert_eq!(clone.done().await, ContextError::Cancelled);
    }

    #[tokio::test]
    async fn cancel_wakes_pending_waiter() {
        let ctx = RequestContext::background();
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.done().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();
        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .expect("task should not panic");
        assert_eq!(reason, ContextError::Cancelled);
    }

    #[tokio::test]
    async fn deadline_fires() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(10));
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }
}
