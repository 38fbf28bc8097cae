use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use runkit::RunContext;
use runkit_cliconf::{Config, ConfigError, EnvSource, ParamErrors, ProcessEnv, render_help_lines};

use crate::error::{CommandError, HelpError};

/// Anything a [`CommandSet`](crate::CommandSet) can dispatch to.
pub trait Runnable: Send + Sync {
    fn run<'a>(
        &'a self,
        ctx: &'a RunContext,
        args: &'a [String],
    ) -> BoxFuture<'a, Result<(), CommandError>>;

    fn help(&self) -> String;

    /// Shown next to the command name when the registering set gives none.
    fn description(&self) -> &str {
        ""
    }

    /// `(name, description)` rows of nested commands.
    fn command_descriptions(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

type Callback<C> =
    Box<dyn Fn(RunContext, C) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type OutcomeCallback = Box<dyn Fn(&RunContext, Option<&anyhow::Error>) + Send + Sync>;

/// Parses argv into `C` and hands it to a callback.
pub struct Command<C> {
    callback: Callback<C>,
    description: String,
    outcome: Option<OutcomeCallback>,
    env: Arc<dyn EnvSource>,
    _config: PhantomData<fn() -> C>,
}

impl<C> Command<C>
where
    C: Config + Default + Send + 'static,
{
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(RunContext, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |ctx, config| callback(ctx, config).boxed()),
            description: String::new(),
            outcome: None,
            env: Arc::new(ProcessEnv),
            _config: PhantomData,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Called with the callback's result after every run that got past
    /// argument parsing.
    pub fn with_outcome_callback<F>(mut self, outcome: F) -> Self
    where
        F: Fn(&RunContext, Option<&anyhow::Error>) + Send + Sync + 'static,
    {
        self.outcome = Some(Box::new(outcome));
        self
    }

    /// Read env vars from `env` instead of the process environment.
    pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    pub fn help_lines(&self, prefix: &str) -> Vec<String> {
        render_help_lines::<C>(prefix)
    }

    fn param_help(&self, errors: &ParamErrors) -> HelpError {
        let mut lines: Vec<String> = errors
            .iter()
            .map(|err| format!("  {} : {}", err.def.name(), err.cause))
            .collect();
        lines.push("Flags and Env Vars:".to_string());
        lines.extend(self.help_lines("  "));
        HelpError {
            usage: "[options]".to_string(),
            lines,
        }
    }
}

impl<C> Runnable for Command<C>
where
    C: Config + Default + Send + 'static,
{
    fn run<'a>(
        &'a self,
        ctx: &'a RunContext,
        args: &'a [String],
    ) -> BoxFuture<'a, Result<(), CommandError>> {
        async move {
            let config: C = match runkit_cliconf::parse(args, self.env.as_ref()) {
                Ok(config) => config,
                Err(ConfigError::Params(errors)) => return Err(self.param_help(&errors).into()),
                Err(err) => return Err(err.into()),
            };

            let result = (self.callback)(ctx.clone(), config).await;
            if let Some(outcome) = &self.outcome {
                outcome(ctx, result.as_ref().err());
            }
            result.map_err(CommandError::Failed)
        }
        .boxed()
    }

    fn help(&self) -> String {
        let mut out = self.description.clone();
        for line in self.help_lines("  ") {
            out.push('\n');
            out.push_str(&line);
        }
        out
    }

    fn description(&self) -> &str {
        &self.description
    }
}
