use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

use futures_util::future::{BoxFuture, FutureExt};
use runkit::{DEFAULT_SIGNALS, RunContext, notify_context};
use runkit_cliconf::even_join;
use tracing::error;

use crate::command::Runnable;
use crate::error::{CommandError, HelpError};

struct NamedRunnable {
    name: String,
    description: String,
    command: Box<dyn Runnable>,
}

/// Named commands, dispatched on the first non-flag argument. Sets nest.
#[derive(Default)]
pub struct CommandSet {
    commands: Vec<NamedRunnable>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `command` under `name`, listed with the command's own
    /// description.
    pub fn add(&mut self, name: impl Into<String>, command: impl Runnable + 'static) -> &mut Self {
        let description = command.description().to_string();
        self.add_with_description(name, command, description)
    }

    pub fn add_with_description(
        &mut self,
        name: impl Into<String>,
        command: impl Runnable + 'static,
        description: impl Into<String>,
    ) -> &mut Self {
        self.commands.push(NamedRunnable {
            name: name.into(),
            description: description.into(),
            command: Box::new(command),
        });
        self
    }

    fn find(&self, name: &str) -> Option<&NamedRunnable> {
        self.commands.iter().find(|c| c.name == name)
    }

    fn list_commands(&self, prefix: &str) -> Vec<String> {
        even_join(prefix, &self.command_descriptions())
    }

    /// Write the usage report for a failed or missing command to `err_out`.
    /// Returns true when the command ran and succeeded.
    ///
    /// `args` is the full argv, program name first.
    pub async fn run_main_with(
        &self,
        ctx: &RunContext,
        err_out: &mut dyn Write,
        args: &[String],
    ) -> bool {
        let cli_name = args.first().map(String::as_str).unwrap_or_default();
        let mut report = String::new();

        let ok = if args.len() < 2 {
            report.push_str(&format!("Usage: {cli_name} <command> [options]\n"));
            self.push_commands(&mut report);
            false
        } else {
            let (name, remaining) = parse_args(&args[1..]);
            let name = name.unwrap_or_default();
            match self.find(&name) {
                None => {
                    report.push_str(&format!("Unknown command: '{name}'\n"));
                    self.push_commands(&mut report);
                    false
                }
                Some(command) => match command.command.run(ctx, &remaining).await {
                    Ok(()) => true,
                    Err(CommandError::Help(help)) => {
                        report.push_str(&format!("Usage: {cli_name} {name} {}\n", help.usage));
                        for line in &help.lines {
                            report.push_str(line);
                            report.push('\n');
                        }
                        false
                    }
                    Err(err) => {
                        report.push_str(&format!("Command {name:?} returned error\n{err:#}\n"));
                        false
                    }
                },
            }
        };

        if !report.is_empty() {
            if let Err(err) = err_out.write_all(report.as_bytes()) {
                error!(error = %err, "failed to write usage report");
            }
        }
        ok
    }

    /// Usage report for an argv entry that is not valid UTF-8. `bad` is
    /// its lossy rendering.
    pub fn report_invalid_argument(&self, err_out: &mut dyn Write, cli_name: &str, bad: &str) {
        let mut report = format!("Invalid argument: '{bad}' is not valid UTF-8\n");
        report.push_str(&format!("Usage: {cli_name} <command> [options]\n"));
        self.push_commands(&mut report);
        if let Err(err) = err_out.write_all(report.as_bytes()) {
            error!(error = %err, "failed to write usage report");
        }
    }

    fn push_commands(&self, report: &mut String) {
        for line in self.list_commands("  ") {
            report.push_str(&line);
            report.push('\n');
        }
    }

    /// Process entry point: installs tracing, runs the command named by
    /// argv on a fresh runtime under a context canceled by SIGINT/SIGTERM,
    /// and maps the outcome to an exit code.
    pub fn run_main(&self, name: &str, version: &str) -> ExitCode {
        crate::init_tracing();

        let args = match utf8_args(std::env::args_os()) {
            Ok(args) => args,
            Err(bad) => {
                let cli_name = std::env::args_os()
                    .next()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.report_invalid_argument(&mut io::stderr(), &cli_name, &bad);
                return ExitCode::FAILURE;
            }
        };
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(error = %err, "failed to start runtime");
                return ExitCode::FAILURE;
            }
        };

        let ok = runtime.block_on(async {
            let base = RunContext::background()
                .with_field("app", name)
                .with_field("version", version);
            let ctx = match notify_context(&base, DEFAULT_SIGNALS) {
                Ok(ctx) => ctx,
                Err(err) => {
                    error!(error = %err, "failed to install signal handlers");
                    return false;
                }
            };
            let ok = self
                .run_main_with(&ctx, &mut io::stderr(), &args)
                .await;
            ctx.cancel();
            ok
        });

        if ok {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

impl Runnable for CommandSet {
    fn run<'a>(
        &'a self,
        ctx: &'a RunContext,
        args: &'a [String],
    ) -> BoxFuture<'a, Result<(), CommandError>> {
        async move {
            if args.is_empty() {
                return Err(HelpError {
                    usage: "<command> [options]".to_string(),
                    lines: self.list_commands("  "),
                }
                .into());
            }

            let (name, remaining) = parse_args(args);
            let Some(command) = name.as_deref().and_then(|name| self.find(name)) else {
                return Err(HelpError {
                    usage: String::new(),
                    lines: self.list_commands("  "),
                }
                .into());
            };

            match command.command.run(ctx, &remaining).await {
                Err(CommandError::Help(mut help)) => {
                    help.usage = format!("{} {}", command.name, help.usage);
                    Err(help.into())
                }
                other => other,
            }
        }
        .boxed()
    }

    fn help(&self) -> String {
        self.list_commands("").join("\n")
    }

    fn command_descriptions(&self) -> Vec<(String, String)> {
        let mut rows = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            rows.push((command.name.clone(), command.description.clone()));
            for (name, description) in command.command.command_descriptions() {
                rows.push((format!(" | {name}"), description));
            }
        }
        rows
    }
}

/// Convert argv to strings, or return the lossy rendering of the first
/// entry that is not valid UTF-8.
fn utf8_args<I>(args: I) -> Result<Vec<String>, String>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            arg.into_string()
                .map_err(|bad| bad.to_string_lossy().into_owned())
        })
        .collect()
}

/// Split argv (without the program name) into the command name and the
/// arguments for it.
///
/// Flags in front of the command name are moved behind it so they act as
/// global flags. `--key value` takes the next token as its value, so a
/// leading boolean needs `--flag=true`.
pub fn parse_args(args: &[String]) -> (Option<String>, Vec<String>) {
    let mut out = Vec::with_capacity(args.len());
    let mut rest = args;
    while let Some((arg, tail)) = rest.split_first() {
        if !arg.starts_with('-') {
            break;
        }
        out.push(arg.clone());
        rest = tail;
        if arg.contains('=') {
            continue;
        }
        match rest.split_first() {
            Some((value, tail)) => {
                out.push(value.clone());
                rest = tail;
            }
            None => break,
        }
    }

    match rest.split_first() {
        Some((command, tail)) => {
            out.extend(tail.iter().cloned());
            (Some(command.clone()), out)
        }
        None => (None, out),
    }
}
