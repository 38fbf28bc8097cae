//! Field descriptors and the `Config` trait.
//!
//! A configuration struct describes itself as a flat list of [`Binding`]s:
//! one [`FieldSpec`] per field plus a mutable slot the resolver writes the
//! coerced value into. `#[derive(Config)]` generates the list from
//! `#[config(...)]` attributes; implementing [`Config`] by hand is the
//! builder form of the same thing.

use std::fmt::Display;
use std::str::FromStr;

use serde::de::DeserializeOwned;

use crate::coerce::{FromParam, from_json};
use crate::error::{CoerceError, ParamDef, SchemaError};

/// Declared sources and metadata of a single field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSpec {
    /// Dotted path of the field, e.g. `db.port`.
    pub field_name: String,
    pub flag: Option<String>,
    pub env: Option<String>,
    /// `Some("")` is a real default, distinct from `None`.
    pub default: Option<String>,
    pub optional: bool,
    pub is_bool: bool,
    pub arg: Option<usize>,
    pub remaining: bool,
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ..Default::default()
        }
    }

    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.flag = Some(name.into());
        self
    }

    pub fn env(mut self, name: impl Into<String>) -> Self {
        self.env = Some(name.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn arg(mut self, index: usize) -> Self {
        self.arg = Some(index);
        self
    }

    pub fn remaining(mut self) -> Self {
        self.remaining = true;
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn def(&self) -> ParamDef {
        ParamDef {
            flag: self.flag.clone(),
            env: self.env.clone(),
            field_name: self.field_name.clone(),
            arg: self.arg,
            remaining: self.remaining,
        }
    }

    pub fn is_positional(&self) -> bool {
        self.arg.is_some() || self.remaining
    }

    /// Checks the rules that hold for a field on its own. Rules spanning
    /// several fields are checked by the resolver.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let named = self.flag.is_some() || self.env.is_some();
        if !named && !self.is_positional() {
            return Err(SchemaError::Unbound(self.field_name.clone()));
        }
        if named && self.is_positional() {
            return Err(SchemaError::PositionalWithName(self.field_name.clone()));
        }
        if self.arg.is_some() && self.remaining {
            return Err(SchemaError::PositionalAndRemaining(self.field_name.clone()));
        }
        Ok(())
    }
}

trait Slot {
    fn set(&mut self, raw: &str) -> Result<(), CoerceError>;
}

struct ParamSlot<'a, T>(&'a mut T);

impl<T: FromParam> Slot for ParamSlot<'_, T> {
    fn set(&mut self, raw: &str) -> Result<(), CoerceError> {
        *self.0 = T::from_param(raw)?;
        Ok(())
    }
}

struct JsonSlot<'a, T>(&'a mut T);

impl<T: DeserializeOwned> Slot for JsonSlot<'_, T> {
    fn set(&mut self, raw: &str) -> Result<(), CoerceError> {
        *self.0 = from_json(raw)?;
        Ok(())
    }
}

struct FromStrSlot<'a, T>(&'a mut T);

impl<T> Slot for FromStrSlot<'_, T>
where
    T: FromStr,
    T::Err: Display,
{
    fn set(&mut self, raw: &str) -> Result<(), CoerceError> {
        *self.0 = raw
            .parse()
            .map_err(|err: T::Err| CoerceError::Custom(err.to_string()))?;
        Ok(())
    }
}

enum Target<'a> {
    Value(Box<dyn Slot + 'a>),
    Remaining(&'a mut Vec<String>),
}

/// A field descriptor tied to the field it populates.
pub struct Binding<'a> {
    spec: FieldSpec,
    target: Target<'a>,
}

impl<'a> Binding<'a> {
    /// Bind a field whose type implements [`FromParam`].
    pub fn value<T: FromParam + 'a>(mut spec: FieldSpec, slot: &'a mut T) -> Self {
        spec.is_bool = T::IS_BOOL;
        Self {
            spec,
            target: Target::Value(Box::new(ParamSlot(slot))),
        }
    }

    /// Bind a struct-valued field decoded from a JSON object literal.
    pub fn json<T: DeserializeOwned + 'a>(spec: FieldSpec, slot: &'a mut T) -> Self {
        Self {
            spec,
            target: Target::Value(Box::new(JsonSlot(slot))),
        }
    }

    /// Bind a field through its `FromStr` impl.
    pub fn from_str<T>(spec: FieldSpec, slot: &'a mut T) -> Self
    where
        T: FromStr + 'a,
        T::Err: Display,
    {
        Self {
            spec,
            target: Target::Value(Box::new(FromStrSlot(slot))),
        }
    }

    /// Bind the field that collects positional args no `arg` field claimed.
    pub fn remaining(spec: FieldSpec, slot: &'a mut Vec<String>) -> Self {
        Self {
            spec: spec.remaining(),
            target: Target::Remaining(slot),
        }
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    /// Coerce `raw` into a value field. The remaining field is only ever
    /// filled through `set_remaining`.
    pub(crate) fn set(&mut self, raw: &str) -> Result<(), CoerceError> {
        if let Target::Value(slot) = &mut self.target {
            slot.set(raw)?;
        }
        Ok(())
    }

    pub(crate) fn set_remaining(&mut self, args: Vec<String>) {
        if let Target::Remaining(slot) = &mut self.target {
            **slot = args;
        }
    }
}

impl std::fmt::Debug for Binding<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding").field("spec", &self.spec).finish()
    }
}

/// A structure that can be populated from flags, env vars and arguments.
///
/// `prefix` is the dotted path of the struct inside its parent and is empty
/// at the top level. Field names are qualified with [`qualify`]; flag and
/// env names are never prefixed.
pub trait Config {
    fn bind<'a>(&'a mut self, prefix: &str, out: &mut Vec<Binding<'a>>);
}

/// Join a parent path and a field name with a dot.
pub fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Collect the bindings of `config`, depth first in declaration order.
pub fn bindings_of<C: Config>(config: &mut C) -> Vec<Binding<'_>> {
    let mut out = Vec::new();
    config.bind("", &mut out);
    out
}
