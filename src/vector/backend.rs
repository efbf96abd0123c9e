//! Strategy selection: the same env specs on any worker transport.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{Backend, VectorConfig};
use crate::core::{Env, Result};
use crate::registry::{EnvSpec, Registry};
use crate::worker::WorkerCommand;

use super::VectorEnv;

impl Backend {
    /// Start one worker per spec, in order, on this backend.
    ///
    /// Direct and remote workers build their environment from `registry`;
    /// process workers run the worker program, which resolves the spec against
    /// its own registry. Any failure stops construction and closes the workers
    /// started so far.
    pub fn launch<E, O, A>(&self, specs: &[EnvSpec], registry: &Registry<E>, reset_after_done: bool) -> Result<VectorEnv<O, A>>
    where
        E: Env<Obs = O, Act = A> + 'static,
        O: Clone + Send + DeserializeOwned + 'static,
        A: Send + Serialize + 'static,
    {
        tracing::debug!(backend = self.name(), envs = specs.len(), "launching vector env");
        match self {
            Backend::Direct => {
                let factories = specs.iter().map(|s| registry.factory(s)).collect::<Result<Vec<_>>>()?;
                VectorEnv::direct(factories, reset_after_done)
            }
            Backend::Remote(config) => {
                let factories = specs.iter().map(|s| registry.factory(s)).collect::<Result<Vec<_>>>()?;
                VectorEnv::remote(factories, reset_after_done, config)
            }
            Backend::Process(config) => {
                let program = config.resolved_program()?;
                let commands: Vec<WorkerCommand> =
                    specs.iter().map(|s| WorkerCommand::for_spec(program.clone(), s)).collect();
                VectorEnv::subprocess(&commands, reset_after_done, config)
            }
        }
    }
}

impl VectorConfig {
    /// Launch `specs` with this configuration.
    pub fn launch<E, O, A>(&self, specs: &[EnvSpec], registry: &Registry<E>) -> Result<VectorEnv<O, A>>
    where
        E: Env<Obs = O, Act = A> + 'static,
        O: Clone + Send + DeserializeOwned + 'static,
        A: Send + Serialize + 'static,
    {
        self.backend.launch(specs, registry, self.reset_after_done)
    }
}
