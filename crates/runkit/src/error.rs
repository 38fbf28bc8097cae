use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group already triggered")]
    AlreadyStarted,

    #[error("group has not been started")]
    NotStarted,

    #[error("group is already waiting")]
    AlreadyWaiting,

    #[error("group is closed, cannot add runner {0}")]
    Closed(String),

    #[error("runner {runner} exited with error: {source}")]
    Runner {
        runner: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("runner {runner} panicked: {message}")]
    Panicked { runner: String, message: String },

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error("context canceled")]
    Canceled,
}

impl GroupError {
    /// Name of the runner behind a runner failure.
    pub fn runner(&self) -> Option<&str> {
        match self {
            GroupError::Runner { runner, .. } | GroupError::Panicked { runner, .. } => {
                Some(runner)
            }
            _ => None,
        }
    }
}
