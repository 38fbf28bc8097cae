//! Unnamed, unlogged fan-out of subtasks sharing one context.
//!
//! Every task starts as soon as it is spawned and there is no concurrency
//! limit. The first failure cancels the shared context; siblings only ever
//! see plain cancellation, never the failure itself.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;

use crate::context::{Canceled, RunContext};

pub struct Parallel {
    parent: RunContext,
    ctx: RunContext,
    tasks: JoinSet<()>,
    first_error: Arc<Mutex<Option<anyhow::Error>>>,
}

impl Parallel {
    pub fn new(parent: &RunContext) -> Self {
        Self {
            parent: parent.clone(),
            ctx: parent.child(),
            tasks: JoinSet::new(),
            first_error: Arc::default(),
        }
    }

    /// The context handed to every spawned task.
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Start `f` now on the shared context.
    pub fn spawn<F, Fut>(&mut self, f: F)
    where
        F: FnOnce(RunContext) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let fut = f(self.ctx.clone());
        let token = self.ctx.token().clone();
        let first_error = Arc::clone(&self.first_error);
        self.tasks.spawn(async move {
            if let Err(err) = fut.await {
                let mut first = first_error.lock();
                if first.is_none() {
                    *first = Some(err);
                }
                token.cancel();
            }
        });
    }

    /// Wait for every task. Returns the first error unchanged, else
    /// [`Canceled`] if the parent context was canceled.
    ///
    /// A panicking task is resumed on the caller.
    pub async fn wait(mut self) -> anyhow::Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }
        self.ctx.cancel();

        if let Some(err) = self.first_error.lock().take() {
            return Err(err);
        }
        if self.parent.is_cancelled() {
            return Err(Canceled.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::context::is_canceled;

    #[derive(Debug, thiserror::Error)]
    #[error("sub task failed")]
    struct SubTaskError;

    #[tokio::test]
    async fn all_ok() {
        let parent = RunContext::background();
        let count = Arc::new(AtomicUsize::new(0));
        let mut group = Parallel::new(&parent);
        for _ in 0..4 {
            let count = Arc::clone(&count);
            group.spawn(move |_ctx| async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        group.wait().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn first_error_cancels_siblings() {
        let parent = RunContext::background();
        let mut group = Parallel::new(&parent);
        let (tx, rx) = tokio::sync::oneshot::channel();
        group.spawn(move |ctx: RunContext| async move {
            ctx.cancelled().await;
            let _ = tx.send(ctx.err());
            Err(Canceled.into())
        });
        group.spawn(|_ctx| async { Err(SubTaskError.into()) });

        let err = group.wait().await.unwrap_err();
        assert!(err.downcast_ref::<SubTaskError>().is_some());
        assert_eq!(rx.await.unwrap(), Err(Canceled));
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancel_reports_canceled() {
        let parent = RunContext::background();
        let mut group = Parallel::new(&parent);
        group.spawn(|ctx: RunContext| async move {
            ctx.cancelled().await;
            Ok(())
        });
        parent.cancel();
        let err = group.wait().await.unwrap_err();
        assert!(is_canceled(&err));
    }
}
