use runkit_cliconf::ConfigError;
use thiserror::Error;

/// A failure that should be shown to the user with usage text instead of
/// a plain error message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", .lines.join("\n"))]
pub struct HelpError {
    /// Usage suffix, e.g. `[options]` or `sub <command> [options]`.
    pub usage: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Help(#[from] HelpError),

    /// Bad field declarations or an unreadable env file.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}
