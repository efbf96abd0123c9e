// Core traits and types: the environment contract shared by every worker strategy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A small ordered info map attached to every step.
/// It stores few key-value pairs, keeps insertion order and serializes as a list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    entries: Vec<(String, InfoValue)>,
}

impl Info {
    /// Create an empty Info map.
    pub fn new() -> Self { Self { entries: Vec::new() } }

    /// Insert or replace a key with the given value.
    pub fn insert<K: Into<String>>(&mut self, key: K, value: InfoValue) {
        let k = key.into();
        if let Some((_, v)) = self.entries.iter_mut().find(|(kk, _)| kk == &k) {
            *v = value;
        } else {
            self.entries.push((k, value));
        }
    }

    /// Builder-style insert.
    pub fn with<K: Into<String>, V: Into<InfoValue>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value.into());
        self
    }

    /// Get a reference to a value by key.
    pub fn get(&self, key: &str) -> Option<&InfoValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &InfoValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Number of entries.
    pub fn len(&self) -> usize { self.entries.len() }
}

/// A small set of value types commonly used in info maps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InfoValue {
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
}

impl From<bool> for InfoValue { fn from(v: bool) -> Self { InfoValue::Bool(v) } }
impl From<i64> for InfoValue { fn from(v: i64) -> Self { InfoValue::I64(v) } }
impl From<i32> for InfoValue { fn from(v: i32) -> Self { InfoValue::I64(v as i64) } }
impl From<f64> for InfoValue { fn from(v: f64) -> Self { InfoValue::F64(v) } }
impl From<f32> for InfoValue { fn from(v: f32) -> Self { InfoValue::F64(v as f64) } }
impl From<&str> for InfoValue { fn from(v: &str) -> Self { InfoValue::Str(v.to_string()) } }
impl From<String> for InfoValue { fn from(v: String) -> Self { InfoValue::Str(v) } }

/// A frame returned by `Env::render`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RenderFrame {
    /// Textual representation of a frame (e.g., ASCII art or debug string).
    Text(String),
}

/// One transition reported by an environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step<Obs> {
    pub observation: Obs,
    pub reward: f32,
    pub done: bool,
    pub info: Info,
}

impl<Obs> Step<Obs> {
    pub fn new(observation: Obs, reward: f32, done: bool, info: Info) -> Self {
        Self { observation, reward, done, info }
    }
}

/// Errors across environments, workers and the vector executor.
#[derive(thiserror::Error, Debug)]
pub enum VecEnvError {
    /// Usage error: `step` was called on an environment whose episode already ended.
    #[error("step called after done; reset the environment first")]
    StepAfterDone,
    #[error("Invalid action: {0}")]
    InvalidAction(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Environment not ready: {0}")]
    NotReady(String),
    #[error("Environment construction failed: {0}")]
    Construction(String),
    #[error("Unknown environment id: {0}")]
    UnknownEnv(String),
    #[error("Env id already registered: {0}")]
    DuplicateEnv(String),
    #[error("Worker transport failed: {0}")]
    Transport(String),
    #[error("Worker did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Batch has {got} entries but there are {expected} workers")]
    BatchLength { expected: usize, got: usize },
    #[error("Vector environment is closed")]
    Closed,
    #[error("Worker {index} failed: {source}")]
    Worker {
        index: usize,
        #[source]
        source: Box<VecEnvError>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
    #[error("Other error: {0}")]
    Other(String),
}

impl VecEnvError {
    /// Attribute an error to the worker at `index`.
    pub fn at(self, index: usize) -> Self {
        VecEnvError::Worker { index, source: Box::new(self) }
    }

    /// The innermost error, looking through worker attribution.
    pub fn root_cause(&self) -> &VecEnvError {
        match self {
            VecEnvError::Worker { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Index of the failing worker, if the error was attributed to one.
    pub fn worker_index(&self) -> Option<usize> {
        match self {
            VecEnvError::Worker { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Whether this is a caller mistake (stepping a finished episode) rather than a failure.
    pub fn is_usage_error(&self) -> bool {
        matches!(self.root_cause(), VecEnvError::StepAfterDone)
    }

    /// Whether the failure came from the isolation boundary (crash, broken pipe, timeout).
    pub fn is_transport_failure(&self) -> bool {
        matches!(self.root_cause(), VecEnvError::Transport(_) | VecEnvError::Timeout(_) | VecEnvError::Io(_))
    }
}

/// Convenience alias for results using VecEnvError.
pub type Result<T> = std::result::Result<T, VecEnvError>;

/// Core environment trait.
///
/// `step` after the episode has ended must fail with [`VecEnvError::StepAfterDone`];
/// callers are expected to `reset` first.
pub trait Env {
    type Obs;
    type Act;

    /// Reset the environment to an initial state and return the first observation.
    fn reset(&mut self) -> Self::Obs;

    /// Apply an action and advance the environment by one step.
    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>>;

    /// Reseed internal randomness. `None` keeps the current stream.
    fn seed(&mut self, _seed: Option<u64>) {}

    /// Render a frame of the current state, if supported.
    fn render(&self) -> Option<RenderFrame> { None }

    /// Close and release any external resources. Must be idempotent.
    fn close(&mut self) {}
}

impl<E: Env + ?Sized> Env for Box<E> {
    type Obs = E::Obs;
    type Act = E::Act;

    fn reset(&mut self) -> Self::Obs { (**self).reset() }
    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> { (**self).step(action) }
    fn seed(&mut self, seed: Option<u64>) { (**self).seed(seed) }
    fn render(&self) -> Option<RenderFrame> { (**self).render() }
    fn close(&mut self) { (**self).close() }
}

/// A type-erased environment that can be moved to another thread.
pub type BoxedEnv<O, A> = Box<dyn Env<Obs = O, Act = A> + Send>;
