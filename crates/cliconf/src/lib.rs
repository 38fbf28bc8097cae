//! Populate configuration structs from command-line flags, environment
//! variables, positional arguments and defaults.
//!
//! ```ignore
//! use runkit_cliconf::{Config, ProcessEnv};
//!
//! #[derive(Default, Config)]
//! struct Serve {
//!     #[config(flag = "port", env = "PORT", default = "8080")]
//!     port: u16,
//!     #[config(flag = "verbose")]
//!     verbose: bool,
//!     #[config(remaining)]
//!     rest: Vec<String>,
//! }
//!
//! let serve: Serve = runkit_cliconf::parse(&["--port", "9000"], &ProcessEnv)?;
//! ```
//!
//! Each field takes its value from the first source that has one: the flag,
//! then the env var (if non-empty), then `false` for booleans, then the
//! declared default. Fields with none of those are errors unless marked
//! `optional`. All problems found in one parse are reported together.

extern crate self as runkit_cliconf;

mod binding;
mod coerce;
mod env;
mod error;
mod flags;
mod help;
mod resolve;

pub use binding::{Binding, Config, FieldSpec, bindings_of, qualify};
pub use coerce::{FromParam, Json, from_json, parse_duration};
pub use env::{EnvSource, MapEnv, Overlay, ProcessEnv, load_env_file, read_env_file};
pub use error::{
    CoerceError, ConfigError, ParamCause, ParamDef, ParamError, ParamErrors, SchemaError,
};
pub use flags::{FlagMap, parse_flags};
pub use help::{HelpLine, even_join, help_lines, render_help_lines, schema_of};
pub use resolve::{ENV_FILE_FLAG, Resolver, check_schema, parse, parse_into};

/// Derive [`Config`](trait@Config) from `#[config(...)]` field attributes.
pub use runkit_cliconf_macros::Config;
