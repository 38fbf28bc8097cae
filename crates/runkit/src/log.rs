//! Structured log sink used by run groups.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Error => "ERROR",
        })
    }
}

/// Ordered key/value pairs attached to a context and every line logged
/// under it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(IndexMap<String, String>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (k, v)) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v:?}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

pub trait Logger: Send + Sync {
    fn log(&self, level: Level, fields: &Fields, message: &str);

    fn debug(&self, fields: &Fields, message: &str) {
        self.log(Level::Debug, fields, message);
    }

    fn info(&self, fields: &Fields, message: &str) {
        self.log(Level::Info, fields, message);
    }

    fn error(&self, fields: &Fields, message: &str) {
        self.log(Level::Error, fields, message);
    }
}

/// Forwards to `tracing` events. Fields are rendered into one `fields`
/// value since tracing field names are static.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, fields: &Fields, message: &str) {
        match (level, fields.is_empty()) {
            (Level::Debug, true) => tracing::debug!("{message}"),
            (Level::Debug, false) => tracing::debug!(fields = %fields, "{message}"),
            (Level::Info, true) => tracing::info!("{message}"),
            (Level::Info, false) => tracing::info!(fields = %fields, "{message}"),
            (Level::Error, true) => tracing::error!("{message}"),
            (Level::Error, false) => tracing::error!(fields = %fields, "{message}"),
        }
    }
}

/// Hands every line to a closure.
pub struct CallbackLogger<F>(F);

impl<F> CallbackLogger<F>
where
    F: Fn(Level, &Fields, &str) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

impl<F> Logger for CallbackLogger<F>
where
    F: Fn(Level, &Fields, &str) + Send + Sync,
{
    fn log(&self, level: Level, fields: &Fields, message: &str) {
        (self.0)(level, fields, message);
    }
}

impl<L: Logger + ?Sized> Logger for Arc<L> {
    fn log(&self, level: Level, fields: &Fields, message: &str) {
        (**self).log(level, fields, message);
    }
}

pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn fields_keep_insertion_order() {
        let fields = Fields::new()
            .with("app", "demo")
            .with("runner", "web")
            .with("app", "demo2");
        let keys: Vec<_> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["app", "runner"]);
        assert_eq!(fields.get("app"), Some("demo2"));
        assert_eq!(fields.to_string(), r#"app="demo2" runner="web""#);
    }

    #[test]
    fn callback_logger_receives_lines() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let logger = CallbackLogger::new(move |level, fields: &Fields, msg: &str| {
            sink.lock()
                .push((level, fields.get("runner").map(str::to_string), msg.to_string()));
        });
        logger.info(&Fields::new().with("runner", "a"), "hello");
        logger.error(&Fields::new(), "boom");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (Level::Info, Some("a".to_string()), "hello".to_string()));
        assert_eq!(seen[1].0, Level::Error);
    }
}
