//! Help text for configuration structs.

use crate::binding::{Config, FieldSpec, bindings_of};

/// One flag or env var of a configuration struct, as shown in help output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpLine {
    pub flag: Option<String>,
    pub env: Option<String>,
    pub description: String,
    pub default: Option<String>,
    pub required: bool,
}

impl HelpLine {
    fn from_spec(spec: &FieldSpec) -> Self {
        Self {
            flag: spec.flag.clone(),
            env: spec.env.clone(),
            description: spec.description.clone().unwrap_or_default(),
            default: spec.default.clone(),
            required: !spec.optional && !spec.is_bool && spec.default.is_none(),
        }
    }

    /// `--flag / $ENV`, `--flag` or `$ENV`.
    pub fn name(&self) -> String {
        match (&self.flag, &self.env) {
            (Some(flag), Some(env)) => format!("--{flag} / ${env}"),
            (Some(flag), None) => format!("--{flag}"),
            (None, Some(env)) => format!("${env}"),
            (None, None) => String::new(),
        }
    }

    /// Description followed by the default, when there is a non-empty one.
    pub fn detail(&self) -> String {
        match self.default.as_deref() {
            Some(default) if !default.is_empty() => {
                if self.description.is_empty() {
                    format!("(default: {default})")
                } else {
                    format!("{} (default: {default})", self.description)
                }
            }
            _ => self.description.clone(),
        }
    }
}

/// Field descriptors of `C`, nested structs included.
pub fn schema_of<C: Config + Default>() -> Vec<FieldSpec> {
    let mut config = C::default();
    bindings_of(&mut config)
        .iter()
        .map(|b| b.spec().clone())
        .collect()
}

/// Help lines for every flag or env bound field of `C`, in declaration order.
pub fn help_lines<C: Config + Default>() -> Vec<HelpLine> {
    schema_of::<C>()
        .iter()
        .filter(|spec| spec.flag.is_some() || spec.env.is_some())
        .map(HelpLine::from_spec)
        .collect()
}

/// Render `name - description` rows with the names padded to one width.
pub fn even_join(prefix: &str, rows: &[(String, String)]) -> Vec<String> {
    let width = rows
        .iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(0);
    rows.iter()
        .map(|(name, desc)| format!("{prefix}{name:<width$} - {desc}"))
        .collect()
}

/// [`help_lines`] rendered with [`even_join`].
pub fn render_help_lines<C: Config + Default>(prefix: &str) -> Vec<String> {
    let rows: Vec<(String, String)> = help_lines::<C>()
        .iter()
        .map(|line| (line.name(), line.detail()))
        .collect();
    even_join(prefix, &rows)
}
