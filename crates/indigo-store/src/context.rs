//! Cancellation and deadlines for storage operations.
//!
//! Every [`Storage`](crate::Storage) method takes an [`OpContext`]. The
//! context is checked on entry and between the items of a multi-document
//! scan. Single-document I/O is spawned onto the runtime and raced against
//! the context: when the caller gives up first, the spawned task is left to
//! finish on its own and its result is dropped. Writes only become visible
//! through an atomic rename, so an abandoned task never exposes a partial
//! document.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StoreResult};

/// Why a context stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// [`OpContext::cancel`] was called (on this context or a parent).
    #[error("context cancelled")]
    Cancelled,
    /// The deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal plus optional deadline, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A context that never expires unless cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Wrap an existing token (e.g. one cancelled by a shutdown handler).
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a context that is cancelled together with `self` and shares
    /// its deadline. Cancelling the child leaves `self` running.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context that also expires after `timeout`; the
    /// earlier of that and the parent's deadline wins.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(match self.deadline {
                Some(parent) => parent.min(deadline),
                None => deadline,
            }),
        }
    }

    /// Cancel this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `Some` once the context has stopped.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fail with [`StoreError::Context`] if the context has stopped.
    pub fn check(&self, op: &'static str) -> StoreResult<()> {
        match self.err() {
            Some(source) => Err(StoreError::Context { op, source }),
            None => Ok(()),
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => ContextError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Run `fut` until it completes or the context stops, whichever is first.
    ///
    /// A context that has already stopped wins even if `fut` is ready.
    pub async fn race<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.check(op)?;
        tokio::select! {
            biased;
            source = self.done() => Err(StoreError::Context { op, source }),
            res = fut => res,
        }
    }

    /// Spawn `fut` on the runtime and race its completion against the
    /// context. If the context wins, the task keeps running detached and its
    /// output is discarded.
    pub async fn spawn<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.check(op)?;
        let handle = tokio::spawn(fut);
        tokio::select! {
            biased;
            source = self.done() => Err(StoreError::Context { op, source }),
            joined = handle => joined?,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[test]
    fn background_never_expires() {
        let ctx = OpContext::background();
        assert!(ctx.err().is_none());
        assert!(ctx.check("test").is_ok());
    }

    #[test]
    fn cancel_propagates_to_children() {
        let parent = OpContext::background();
        let child = parent.child();
        parent.cancel();
        assert_eq!(child.err(), Some(ContextError::Cancelled));
        let err = child.check("get").unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn cancelling_a_child_leaves_the_parent_alone() {
        let parent = OpContext::background();
        let child = parent.child();
        child.cancel();
        assert!(parent.err().is_none());
    }

    #[tokio::test]
    async fn expired_deadline_is_reported() {
        let ctx = OpContext::with_timeout(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn child_keeps_the_earlier_deadline() {
        let parent = OpContext::with_timeout(Duration::from_millis(5));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn child_shares_the_parent_deadline() {
        let parent = OpContext::with_timeout(Duration::from_secs(60));
        assert_eq!(parent.child().deadline(), parent.deadline());
        assert_eq!(OpContext::background().child().deadline(), None);

        let shorter = parent.child_with_timeout(Duration::from_millis(5));
        assert!(shorter.deadline() < parent.deadline());
    }

    #[tokio::test]
    async fn race_returns_the_future_result() {
        let ctx = OpContext::background();
        let v = ctx.race("op", async { Ok::<_, StoreError>(7) }).await.unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn race_prefers_an_already_cancelled_context() {
        let ctx = OpContext::background();
        ctx.cancel();
        let err = ctx
            .race("op", async { Ok::<_, StoreError>(7) })
            .await
            .unwrap_err();
        assert_eq!(err.context_error(), Some(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn race_times_out_a_slow_future() {
        let ctx = OpContext::with_timeout(Duration::from_millis(20));
        let started = std::time::Instant::now();
        let err = ctx
            .race("slow", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.context_error(), Some(ContextError::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn spawn_abandons_but_does_not_kill_the_task() {
        let ctx = OpContext::background();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let ctx2 = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ctx2.cancel();
        });

        let err = ctx
            .spawn("write", async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
