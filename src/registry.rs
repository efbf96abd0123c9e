//! Named environment factories.
//!
//! An [`EnvSpec`] (id + string kwargs) is the serializable form of a zero-argument
//! factory: it can be turned into a closure in this process, or sent on a command
//! line to a worker process that owns its own [`Registry`].

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{Result, VecEnvError};

/// Key-value kwargs for factories. Ordered so command lines are reproducible.
pub type KwArgs = BTreeMap<String, String>;

/// Environment id plus construction arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSpec {
    /// Registered identifier like "Counter".
    pub id: String,
    #[serde(default)]
    pub kwargs: KwArgs,
}

impl EnvSpec {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), kwargs: KwArgs::new() }
    }

    pub fn with_kwarg<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.kwargs.insert(key.into(), value.to_string());
        self
    }
}

/// Parse `key` from kwargs, falling back to `default` when absent.
pub fn kwarg_or<T>(kwargs: &KwArgs, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match kwargs.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| VecEnvError::Construction(format!("bad value for `{key}`: {raw:?} ({e})"))),
    }
}

/// Factory closure type for constructing environments from kwargs.
pub type FactoryFn<E> = Arc<dyn Fn(&KwArgs) -> Result<E> + Send + Sync>;

/// Map from environment id to factory, producing environments of one type `E`
/// (usually a [`crate::core::BoxedEnv`]).
pub struct Registry<E> {
    factories: HashMap<String, FactoryFn<E>>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self { Self { factories: HashMap::new() } }
}

impl<E: 'static> Registry<E> {
    pub fn new() -> Self { Self::default() }

    /// Register a factory under `id`. Ids are unique.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&KwArgs) -> Result<E> + Send + Sync + 'static,
    {
        let id = id.into();
        if self.factories.contains_key(&id) {
            return Err(VecEnvError::DuplicateEnv(id));
        }
        self.factories.insert(id, Arc::new(factory));
        Ok(())
    }

    /// Builder-style registration; replaces any factory already under `id`.
    pub fn with<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&KwArgs) -> Result<E> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, id: &str) -> bool { self.factories.contains_key(id) }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Construct an environment now.
    pub fn make(&self, spec: &EnvSpec) -> Result<E> {
        (self.factory(spec)?)()
    }

    /// A zero-argument factory for `spec` that can be moved to another thread.
    pub fn factory(&self, spec: &EnvSpec) -> Result<impl FnOnce() -> Result<E> + Send + 'static> {
        let f = self
            .factories
            .get(&spec.id)
            .cloned()
            .ok_or_else(|| VecEnvError::UnknownEnv(spec.id.clone()))?;
        let kwargs = spec.kwargs.clone();
        Ok(move || f(&kwargs))
    }
}
