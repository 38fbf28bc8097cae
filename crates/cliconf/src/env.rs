//! Environment variable sources.

use std::collections::HashMap;
use std::path::Path;

/// Read access to environment variables.
pub trait EnvSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// The environment of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// A fixed set of variables, handy in tests and for env files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, String>> for MapEnv {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl EnvSource for MapEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Variables from `top` shadow those of `base`.
pub struct Overlay<'a> {
    top: MapEnv,
    base: &'a dyn EnvSource,
}

impl<'a> Overlay<'a> {
    pub fn new(top: MapEnv, base: &'a dyn EnvSource) -> Self {
        Self { top, base }
    }
}

impl EnvSource for Overlay<'_> {
    fn get(&self, key: &str) -> Option<String> {
        self.top.get(key).or_else(|| self.base.get(key))
    }
}

/// Parse a dotenv file without touching the process environment.
///
/// An empty path yields an empty map.
pub fn read_env_file(path: impl AsRef<Path>) -> Result<MapEnv, dotenvy::Error> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Ok(MapEnv::new());
    }
    dotenvy::from_path_iter(path)?.collect()
}

/// Load a dotenv file into the process environment, overriding variables
/// that are already set.
pub fn load_env_file(path: impl AsRef<Path>) -> Result<(), dotenvy::Error> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    dotenvy::from_path_override(path)
}
