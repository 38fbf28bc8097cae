//! Cancellable execution context carrying log fields.

use thiserror::Error;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::GroupError;
use crate::log::Fields;

/// Field naming the runner a line belongs to.
pub const RUNNER_FIELD: &str = "runner";

/// Returned by tasks that stopped because their context was canceled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("context canceled")]
pub struct Canceled;

/// True when `err` or any error in its chain is a cancellation.
pub fn is_canceled(err: &anyhow::Error) -> bool {
    err.chain().any(|e| {
        e.is::<Canceled>() || matches!(e.downcast_ref::<GroupError>(), Some(GroupError::Canceled))
    })
}

/// A cancellation token plus the structured fields of everything running
/// under it. Clones share the token.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    token: CancellationToken,
    fields: Fields,
}

impl RunContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            fields: Fields::new(),
        }
    }

    /// A root context that is only canceled explicitly.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key, value);
        self
    }

    pub fn with_fields(mut self, fields: &Fields) -> Self {
        for (k, v) in fields.iter() {
            self.fields.insert(k, v);
        }
        self
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// This context tagged with `runner = name`.
    pub fn runner(&self, name: &str) -> Self {
        self.clone().with_field(RUNNER_FIELD, name)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// A context canceled along with this one, which can also be canceled
    /// on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            fields: self.fields.clone(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// `Err(Canceled)` once the context is canceled.
    pub fn err(&self) -> Result<(), Canceled> {
        if self.is_cancelled() {
            Err(Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_follows_parent() {
        let parent = RunContext::background().with_field("app", "demo");
        let child = parent.child();
        assert_eq!(child.fields().get("app"), Some("demo"));

        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
        assert_eq!(other.err(), Err(Canceled));
    }

    #[test]
    fn runner_adds_field() {
        let ctx = RunContext::background().runner("web");
        assert_eq!(ctx.fields().get(RUNNER_FIELD), Some("web"));
    }

    #[test]
    fn detects_cancellation_in_chain() {
        let err = anyhow::Error::new(Canceled).context("while polling");
        assert!(is_canceled(&err));
        assert!(is_canceled(&anyhow::Error::new(GroupError::Canceled)));
        assert!(!is_canceled(&anyhow::anyhow!("boom")));
    }
}
