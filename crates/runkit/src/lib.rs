//! Supervised task groups for command-line services.
//!
//! - [`Group`]: named runners under one cancellable [`RunContext`], first
//!   error wins and cancels the rest, structured lifecycle logging.
//! - [`Parallel`]: the same first-error semantics without names or logging.
//! - [`notify_context`]: a context canceled by OS termination signals.

pub mod context;
pub mod error;
pub mod group;
pub mod log;
pub mod parallel;
pub mod signal;

pub use context::{Canceled, RUNNER_FIELD, RunContext, is_canceled};
pub use error::GroupError;
pub use group::Group;
pub use log::{CallbackLogger, Fields, Level, Logger, TracingLogger};
pub use parallel::Parallel;
pub use signal::{DEFAULT_SIGNALS, Signal, notify_context};
