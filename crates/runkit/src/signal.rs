//! OS termination signals as a cancellation source.

use std::io;

use futures_util::future::{BoxFuture, FutureExt};

use crate::context::RunContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Interrupt,
    Terminate,
    Hangup,
    Quit,
}

/// Used when a caller asks for signal handling without naming signals.
pub const DEFAULT_SIGNALS: &[Signal] = &[Signal::Interrupt, Signal::Terminate];

/// Derive a child of `parent` that is canceled when one of `signals` arrives.
///
/// Handlers are installed before this returns, so a signal sent right after
/// the call is not missed. An empty list means [`DEFAULT_SIGNALS`]. Must be
/// called inside a Tokio runtime.
pub fn notify_context(parent: &RunContext, signals: &[Signal]) -> io::Result<RunContext> {
    let signals = if signals.is_empty() {
        DEFAULT_SIGNALS
    } else {
        signals
    };
    let received = listen(signals)?;
    let ctx = parent.child();
    let token = ctx.token().clone();

    tokio::spawn(async move {
        tokio::select! {
            signal = received => {
                tracing::debug!(?signal, "received signal, canceling context");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });

    Ok(ctx)
}

#[cfg(unix)]
fn listen(signals: &[Signal]) -> io::Result<BoxFuture<'static, Signal>> {
    use futures_util::future::select_all;
    use tokio::signal::unix::{SignalKind, signal};

    let mut waits = Vec::with_capacity(signals.len());
    for &sig in signals {
        let kind = match sig {
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Terminate => SignalKind::terminate(),
            Signal::Hangup => SignalKind::hangup(),
            Signal::Quit => SignalKind::quit(),
        };
        let mut stream = signal(kind)?;
        waits.push(
            async move {
                stream.recv().await;
                sig
            }
            .boxed(),
        );
    }

    Ok(async move { select_all(waits).await.0 }.boxed())
}

#[cfg(not(unix))]
fn listen(_signals: &[Signal]) -> io::Result<BoxFuture<'static, Signal>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
        Signal::Interrupt
    }
    .boxed())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parent_cancel_propagates() {
        let parent = RunContext::background();
        let ctx = notify_context(&parent, &[Signal::Hangup]).unwrap();
        assert!(!ctx.is_cancelled());
        parent.cancel();
        ctx.cancelled().await;
    }

    #[tokio::test]
    async fn signal_cancels_context() {
        let parent = RunContext::background();
        let ctx = notify_context(&parent, &[Signal::Quit]).unwrap();

        let pid = std::process::id().to_string();
        let status = std::process::Command::new("kill")
            .args(["-QUIT", &pid])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(std::time::Duration::from_secs(5), ctx.cancelled())
            .await
            .unwrap();
        assert!(!parent.is_cancelled());
    }
}
