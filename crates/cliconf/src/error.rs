use std::fmt;
use std::num::{ParseFloatError, ParseIntError};
use std::ops::Deref;

use thiserror::Error;

/// Identifies the parameter an error belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamDef {
    pub flag: Option<String>,
    pub env: Option<String>,
    /// Dotted path of the field, e.g. `nested.n1`.
    pub field_name: String,
    pub arg: Option<usize>,
    pub remaining: bool,
}

impl ParamDef {
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            flag: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn remaining() -> Self {
        Self {
            remaining: true,
            ..Default::default()
        }
    }

    /// Name as a user would type or set it: `--flag / $ENV`, `<arg0>`, ...
    pub fn name(&self) -> String {
        match (&self.flag, &self.env) {
            (Some(flag), Some(env)) => format!("--{flag} / ${env}"),
            (Some(flag), None) => format!("--{flag}"),
            (None, Some(env)) => format!("${env}"),
            (None, None) => {
                if let Some(n) = self.arg {
                    format!("<arg{n}>")
                } else if self.remaining {
                    "<remaining args>".to_string()
                } else if !self.field_name.is_empty() {
                    self.field_name.clone()
                } else {
                    "<unknown>".to_string()
                }
            }
        }
    }
}

/// Failure to convert a raw string into a field's type.
#[derive(Debug, Error)]
pub enum CoerceError {
    #[error("invalid integer {value:?}: {source}")]
    Int {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid float {value:?}: {source}")]
    Float {
        value: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("invalid duration {0:?}")]
    Duration(String),

    #[error("struct fields should be set using JSON strings")]
    NotJson,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

#[derive(Debug, Error)]
pub enum ParamCause {
    #[error("required")]
    Required,

    #[error("unknown flag")]
    UnknownFlag,

    #[error("flag has no value")]
    NoValue,

    #[error("too many remaining args")]
    TooManyRemaining,

    #[error(transparent)]
    Coerce(#[from] CoerceError),
}

#[derive(Debug, Error)]
#[error("error parsing {}: {}", .def.name(), .cause)]
pub struct ParamError {
    pub def: ParamDef,
    #[source]
    pub cause: ParamCause,
}

impl ParamError {
    pub fn new(def: ParamDef, cause: impl Into<ParamCause>) -> Self {
        Self {
            def,
            cause: cause.into(),
        }
    }
}

/// Every per-field problem found in one parse, in discovery order.
#[derive(Debug, Default)]
pub struct ParamErrors(Vec<ParamError>);

impl ParamErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: ParamError) {
        self.0.push(err);
    }

    pub fn into_vec(self) -> Vec<ParamError> {
        self.0
    }
}

impl From<Vec<ParamError>> for ParamErrors {
    fn from(errs: Vec<ParamError>) -> Self {
        Self(errs)
    }
}

impl Deref for ParamErrors {
    type Target = [ParamError];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for ParamErrors {
    type Item = ParamError;
    type IntoIter = std::vec::IntoIter<ParamError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ParamErrors {
    type Item = &'a ParamError;
    type IntoIter = std::slice::Iter<'a, ParamError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ParamErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} CLI errors:", self.0.len())?;
        for err in &self.0 {
            writeln!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParamErrors {}

/// Invalid field declarations. Raised before any argument is looked at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("field {0} has no flag, env, argN, or remaining tag")]
    Unbound(String),

    #[error("field {0} is positional and cannot also declare a flag or env")]
    PositionalWithName(String),

    #[error("field {0} cannot be both positional and remaining")]
    PositionalAndRemaining(String),

    #[error("only one field can be tagged with ,remaining ({first} and {second})")]
    DuplicateRemaining { first: String, second: String },

    #[error("positional arg{index} is bound by both {first} and {second}")]
    DuplicateArg {
        index: usize,
        first: String,
        second: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Params(#[from] ParamErrors),

    #[error("failed to load env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: dotenvy::Error,
    },
}
