//! Subcommand dispatch for binaries whose commands are configuration
//! structs.
//!
//! A [`Command`] parses its arguments into a `#[derive(Config)]` struct and
//! calls back with it. A [`CommandSet`] names commands (and other sets) and
//! routes argv to them; [`CommandSet::run_main`] is the whole `main`.
//!
//! ```ignore
//! use runkit_commander::{Command, CommandSet};
//!
//! #[derive(Default, runkit_cliconf::Config)]
//! struct Serve {
//!     #[config(flag = "port", env = "PORT", default = "8080")]
//!     port: u16,
//! }
//!
//! fn main() -> std::process::ExitCode {
//!     let mut set = CommandSet::new();
//!     set.add_with_description(
//!         "serve",
//!         Command::new(|_ctx, cfg: Serve| async move { serve(cfg.port).await }),
//!         "run the server",
//!     );
//!     set.run_main("app", env!("CARGO_PKG_VERSION"))
//! }
//! ```

mod command;
mod error;
mod set;

pub use command::{Command, Runnable};
pub use error::{CommandError, HelpError};
pub use set::{CommandSet, parse_args};

use tracing_subscriber::{EnvFilter, fmt};

/// Install the compact `tracing` subscriber, filtered by `RUST_LOG`
/// (default `info`). Does nothing if a subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
