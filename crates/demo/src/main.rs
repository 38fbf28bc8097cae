use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use runkit::{Canceled, Group, RunContext};
use runkit_cliconf::Config;
use runkit_commander::{Command, CommandSet};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Default, Config)]
struct ServeConfig {
    #[config(flag = "workers", env = "DEMO_WORKERS", default = "2", description = "number of workers")]
    workers: usize,
    #[config(flag = "ticks", default = "3", description = "ticks per worker")]
    ticks: u32,
    #[config(flag = "tick", env = "DEMO_TICK", default = "10ms", description = "delay between ticks")]
    tick: Duration,
    #[config(flag = "fail-after", optional, description = "make worker-0 fail after this many ticks")]
    fail_after: Option<u32>,
    #[config(env = "DEMO_NAME", default = "demo", description = "run group name")]
    name: String,
    #[config(flag = "verbose", description = "print every tick")]
    verbose: bool,
}

#[derive(Debug, Default, Config)]
struct EchoConfig {
    #[config(arg = 0)]
    first: String,
    #[config(remaining)]
    rest: Vec<String>,
    #[config(flag = "prefix", env = "ECHO_PREFIX", optional, description = "printed before the words")]
    prefix: String,
    #[config(flag = "upper", description = "print in upper case")]
    upper: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Style {
    punctuation: String,
    repeat: usize,
}

#[derive(Debug, Default, Config)]
struct GreetConfig {
    #[config(flag = "name", env = "GREET_NAME", default = "world", description = "who to greet")]
    name: String,
    #[config(flag = "style", json, optional, description = "JSON object, e.g. {\"punctuation\":\"!\",\"repeat\":2}")]
    style: Style,
}

async fn serve(ctx: RunContext, cfg: ServeConfig) -> anyhow::Result<()> {
    let cfg = Arc::new(cfg);
    let group = Group::new().with_name(cfg.name.as_str());
    for id in 0..cfg.workers {
        let cfg = Arc::clone(&cfg);
        group.add(format!("worker-{id}"), move |ctx| worker(ctx, id, cfg))?;
    }

    group.run(&ctx).await?;
    println!("{}: {} workers finished", cfg.name, cfg.workers);
    Ok(())
}

async fn worker(ctx: RunContext, id: usize, cfg: Arc<ServeConfig>) -> anyhow::Result<()> {
    for n in 1..=cfg.ticks {
        tokio::select! {
            _ = ctx.cancelled() => return Err(Canceled.into()),
            _ = tokio::time::sleep(cfg.tick) => {}
        }
        if cfg.verbose {
            println!("worker-{id} tick {n}");
        }
        debug!(fields = %ctx.fields(), tick = n, "tick");
        if id == 0 && cfg.fail_after == Some(n) {
            bail!("worker-{id} gave up after {n} ticks");
        }
    }
    Ok(())
}

async fn echo(_ctx: RunContext, cfg: EchoConfig) -> anyhow::Result<()> {
    let mut words = vec![cfg.first];
    words.extend(cfg.rest);
    let mut line = format!("{}{}", cfg.prefix, words.join(" "));
    if cfg.upper {
        line = line.to_uppercase();
    }
    println!("{line}");
    Ok(())
}

async fn greet(_ctx: RunContext, cfg: GreetConfig) -> anyhow::Result<()> {
    for _ in 0..cfg.style.repeat.max(1) {
        println!("Hello, {}{}", cfg.name, cfg.style.punctuation);
    }
    Ok(())
}

fn main() -> ExitCode {
    let mut tools = CommandSet::new();
    tools.add(
        "greet",
        Command::new(greet)
            .with_description("print a greeting")
            .with_outcome_callback(|ctx, err| {
                info!(fields = %ctx.fields(), ok = err.is_none(), "greet finished");
            }),
    );

    let mut set = CommandSet::new();
    set.add(
        "serve",
        Command::new(serve).with_description("run ticking workers in a run group"),
    )
    .add(
        "echo",
        Command::new(echo).with_description("print the positional arguments"),
    )
    .add_with_description("tools", tools, "small utilities");

    set.run_main("runkit-demo", env!("CARGO_PKG_VERSION"))
}
