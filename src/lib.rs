//! Vectorized environments.
//!
//! A [`VectorEnv`] steps N environments with one call. Each environment is
//! owned by a worker; workers run inline ([`DirectWorker`]), in a child
//! process ([`ProcessWorker`]) or on an actor thread ([`ActorWorker`]), and
//! the batches they produce are identical either way. [`FrameStack`] wraps a
//! single environment to expose its last `k` observations.

pub mod config;
pub mod core;
pub mod envs;
pub mod registry;
pub mod utils;
pub mod vector;
pub mod worker;
pub mod wrappers;

pub use crate::config::{Backend, ProcessConfig, RemoteConfig, VectorConfig};
pub use crate::core::{BoxedEnv, Env, Info, InfoValue, RenderFrame, Result, Step, VecEnvError};
pub use crate::envs::{CounterEnv, RandomWalkEnv};
pub use crate::registry::{EnvSpec, KwArgs, Registry};
pub use crate::vector::{BatchStep, Seeds, VectorEnv};
pub use crate::worker::{ActorWorker, DirectWorker, ProcessWorker, Request, Response, Worker, WorkerCommand};
pub use crate::wrappers::FrameStack;

#[cfg(test)]
mod tests {
    use super::*;

    /// A tiny dummy environment to validate the trait compiles and basic methods work.
    struct CounterToThree {
        state: i32,
    }

    impl Env for CounterToThree {
        type Obs = i32;
        type Act = i32;

        fn reset(&mut self) -> Self::Obs {
            self.state = 0;
            self.state
        }

        fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
            if self.state >= 3 {
                return Err(VecEnvError::StepAfterDone);
            }
            self.state += action;
            Ok(Step::new(self.state, 1.0, self.state >= 3, Info::new()))
        }
    }

    #[test]
    fn dummy_env_runs() {
        let mut env = CounterToThree { state: 0 };
        assert_eq!(env.reset(), 0);
        let s1 = env.step(1).unwrap();
        assert_eq!(s1.observation, 1);
        assert!(!s1.done);
        let s2 = env.step(2).unwrap();
        assert_eq!(s2.observation, 3);
        assert!(s2.done);
        assert!(env.render().is_none());
        env.seed(Some(1));
        env.close();
    }

    #[test]
    fn user_envs_run_in_every_in_process_worker() {
        let factories: Vec<_> = (0..2).map(|_| || Ok(CounterToThree { state: 0 })).collect();
        let mut direct = VectorEnv::direct(factories, true).unwrap();
        let factories: Vec<_> = (0..2).map(|_| || Ok(CounterToThree { state: 0 })).collect();
        let mut remote = VectorEnv::remote(factories, true, &RemoteConfig::default()).unwrap();
        direct.reset().unwrap();
        remote.reset().unwrap();
        for actions in [vec![1, 2], vec![2, 1], vec![1, 1]] {
            assert_eq!(direct.step(actions.clone()).unwrap(), remote.step(actions).unwrap());
        }
    }
}
