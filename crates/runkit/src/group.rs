//! Supervised run group.
//!
//! A [`Group`] runs named tasks concurrently under one cancellable context.
//! The first task to fail cancels the context for all the others, and
//! [`Group::wait`] reports that first failure once every task has returned.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::{RunContext, is_canceled};
use crate::error::GroupError;
use crate::log::{Fields, Logger, default_logger};
use crate::signal::Signal;

pub const LOG_GROUP_STARTED: &str = "Run group triggered";
pub const LOG_GROUP_EXITED: &str = "Run group exited";
pub const LOG_GROUP_EXITED_WITH_ERROR: &str = "Run group exited with error";
pub const LOG_RUNNER_STARTED: &str = "Runner started";
pub const LOG_RUNNER_EXITED: &str = "Runner exited";
pub const LOG_RUNNER_EXITED_WITH_ERROR: &str = "Runner exited with error";
pub const LOG_RUNNER_EXITED_WITH_CONTEXT_CANCELED: &str = "Runner exited with context canceled";
pub const LOG_ALL_RUNNERS_EXITED: &str = "All runners exited";

/// Field naming the group, set by [`Group::with_name`].
pub const RUN_GROUP_FIELD: &str = "run_group";
/// Field carrying the error of a failed runner.
pub const ERROR_FIELD: &str = "error";

type Task = Box<dyn FnOnce(RunContext) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct Runner {
    name: String,
    task: Task,
}

struct RunnerHandle {
    name: String,
    join: JoinHandle<()>,
    stopped: CancellationToken,
}

struct Started {
    /// Parent of the group context; canceled only from outside the group.
    base: RunContext,
    /// Set when the group installed its own signal context.
    owns_base: bool,
    ctx: RunContext,
}

enum Phase {
    Idle,
    Running(Started),
    Waiting,
}

struct State {
    phase: Phase,
    pending: Vec<Runner>,
    handles: Vec<RunnerHandle>,
}

pub struct Group {
    name: Option<String>,
    logger: Arc<dyn Logger>,
    signals: Option<Vec<Signal>>,
    state: Mutex<State>,
    first_error: Arc<Mutex<Option<GroupError>>>,
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl Group {
    pub fn new() -> Self {
        Self {
            name: None,
            logger: default_logger(),
            signals: None,
            state: Mutex::new(State {
                phase: Phase::Idle,
                pending: Vec::new(),
                handles: Vec::new(),
            }),
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Tag every line logged by the group with `run_group = name`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Cancel the group when one of `signals` is received. An empty list
    /// selects [`DEFAULT_SIGNALS`](crate::signal::DEFAULT_SIGNALS).
    pub fn with_cancel_on_signals(mut self, signals: &[Signal]) -> Self {
        self.signals = Some(signals.to_vec());
        self
    }

    /// Register a task.
    ///
    /// Before [`start`](Self::start) the task is queued. While the group is
    /// running it is started right away. Once [`wait`](Self::wait) has been
    /// called the group is closed and `add` fails.
    pub fn add<F, Fut>(&self, name: impl Into<String>, f: F) -> Result<(), GroupError>
    where
        F: FnOnce(RunContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let runner = Runner {
            name: name.into(),
            task: Box::new(move |ctx| f(ctx).boxed()),
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match &state.phase {
            Phase::Idle => state.pending.push(runner),
            Phase::Running(started) => {
                let handle = self.spawn_runner(&started.ctx, runner);
                state.handles.push(handle);
            }
            Phase::Waiting => return Err(GroupError::Closed(runner.name)),
        }
        Ok(())
    }

    /// Start every registered task in the background, in registration order.
    ///
    /// Errors are not returned until [`wait`](Self::wait). Must be called
    /// inside a Tokio runtime.
    pub fn start(&self, parent: &RunContext) -> Result<(), GroupError> {
        let mut state = self.state.lock();
        if !matches!(state.phase, Phase::Idle) {
            return Err(GroupError::AlreadyStarted);
        }

        let mut base = parent.clone();
        if let Some(name) = &self.name {
            base = base.with_field(RUN_GROUP_FIELD, name.as_str());
        }
        let owns_base = self.signals.is_some();
        if let Some(signals) = &self.signals {
            base = crate::signal::notify_context(&base, signals).map_err(GroupError::Signal)?;
        }
        let ctx = base.child();

        for runner in std::mem::take(&mut state.pending) {
            let handle = self.spawn_runner(&ctx, runner);
            state.handles.push(handle);
        }
        self.logger.info(ctx.fields(), LOG_GROUP_STARTED);

        state.phase = Phase::Running(Started {
            base,
            owns_base,
            ctx,
        });
        Ok(())
    }

    /// Start the group and wait for it.
    pub async fn run(&self, parent: &RunContext) -> Result<(), GroupError> {
        self.start(parent)?;
        self.wait().await
    }

    /// Close the group and wait until every task has returned.
    ///
    /// Returns the first task failure, or [`GroupError::Canceled`] when no
    /// task failed but the parent context or a signal canceled the group.
    pub async fn wait(&self) -> Result<(), GroupError> {
        let (started, handles) = {
            let mut state = self.state.lock();
            let started = match std::mem::replace(&mut state.phase, Phase::Waiting) {
                Phase::Running(started) => started,
                Phase::Idle => {
                    state.phase = Phase::Idle;
                    return Err(GroupError::NotStarted);
                }
                Phase::Waiting => return Err(GroupError::AlreadyWaiting),
            };
            (started, std::mem::take(&mut state.handles))
        };

        let drain = self.spawn_drain_logger(&started.ctx, &handles);

        for handle in handles {
            if let Err(err) = handle.join.await {
                if err.is_panic() {
                    let message = panic_message(err.into_panic().as_ref());
                    record_error(
                        &self.first_error,
                        started.ctx.token(),
                        GroupError::Panicked {
                            runner: handle.name,
                            message,
                        },
                    );
                }
            }
        }

        if started.ctx.is_cancelled() {
            let _ = drain.await;
        } else {
            drain.abort();
        }

        let first = self.first_error.lock().take();
        let result = match first {
            Some(err) => Err(err),
            None if started.base.is_cancelled() => Err(GroupError::Canceled),
            None => Ok(()),
        };

        started.ctx.cancel();
        if started.owns_base {
            started.base.cancel();
        }

        match &result {
            Ok(()) => self.logger.info(started.ctx.fields(), LOG_GROUP_EXITED),
            Err(err) => self.logger.error(
                &started.ctx.fields().clone().with(ERROR_FIELD, err.to_string()),
                LOG_GROUP_EXITED_WITH_ERROR,
            ),
        }
        result
    }

    fn spawn_runner(&self, group_ctx: &RunContext, runner: Runner) -> RunnerHandle {
        let Runner { name, task } = runner;
        let ctx = group_ctx.runner(&name);
        let fields = ctx.fields().clone();
        let group_token = group_ctx.token().clone();
        let logger = Arc::clone(&self.logger);
        let first_error = Arc::clone(&self.first_error);
        let stopped = CancellationToken::new();
        let done = stopped.clone().drop_guard();
        let runner_name = name.clone();

        let join = tokio::spawn(async move {
            let _done = done;
            logger.info(&fields, LOG_RUNNER_STARTED);

            let outcome = AssertUnwindSafe(async move { task(ctx).await })
                .catch_unwind()
                .await;
            let err = match outcome {
                Ok(Ok(())) => {
                    logger.info(&fields, LOG_RUNNER_EXITED);
                    return;
                }
                Ok(Err(err)) if is_canceled(&err) => {
                    logger.debug(&fields, LOG_RUNNER_EXITED_WITH_CONTEXT_CANCELED);
                    return;
                }
                Ok(Err(err)) => {
                    logger.error(
                        &fields.clone().with(ERROR_FIELD, format!("{err:#}")),
                        LOG_RUNNER_EXITED_WITH_ERROR,
                    );
                    GroupError::Runner {
                        runner: runner_name,
                        source: err,
                    }
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    logger.error(
                        &fields.clone().with(ERROR_FIELD, message.as_str()),
                        LOG_RUNNER_EXITED_WITH_ERROR,
                    );
                    GroupError::Panicked {
                        runner: runner_name,
                        message,
                    }
                }
            };
            record_error(&first_error, &group_token, err);
        });

        RunnerHandle {
            name,
            join,
            stopped,
        }
    }

    /// Once the group context is canceled, log which runners are still
    /// being waited for.
    fn spawn_drain_logger(&self, ctx: &RunContext, handles: &[RunnerHandle]) -> JoinHandle<()> {
        let token = ctx.token().clone();
        let fields: Fields = ctx.fields().clone();
        let logger = Arc::clone(&self.logger);
        let runners: Vec<(String, CancellationToken)> = handles
            .iter()
            .map(|h| (h.name.clone(), h.stopped.clone()))
            .collect();

        tokio::spawn(async move {
            token.cancelled().await;
            for (idx, (_, stopped)) in runners.iter().enumerate() {
                for (name, other) in &runners[idx..] {
                    if !other.is_cancelled() {
                        logger.debug(&fields, &format!("Waiting for runner {name}"));
                    }
                }
                stopped.cancelled().await;
            }
            logger.info(&fields, LOG_ALL_RUNNERS_EXITED);
        })
    }
}

fn record_error(slot: &Mutex<Option<GroupError>>, token: &CancellationToken, err: GroupError) {
    let mut first = slot.lock();
    if first.is_none() {
        *first = Some(err);
    }
    token.cancel();
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
