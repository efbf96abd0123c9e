// Wrappers: environment composition.

use std::collections::VecDeque;

use crate::core::{Env, RenderFrame, Result, Step, VecEnvError};

/// FrameStack exposes the last `k` observations of the wrapped environment,
/// oldest first, as one observation.
///
/// On `reset` the window is filled with `k` copies of the initial observation.
/// Errors from the inner `step` (including stepping after done) pass through untouched.
pub struct FrameStack<E: Env> {
    inner: E,
    k: usize,
    frames: VecDeque<E::Obs>,
}

impl<E> FrameStack<E>
where
    E: Env,
    E::Obs: Clone,
{
    /// Wrap `inner`, keeping `k >= 1` frames.
    pub fn new(inner: E, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(VecEnvError::InvalidArgument("frame stack size must be at least 1".into()));
        }
        Ok(Self { inner, k, frames: VecDeque::with_capacity(k) })
    }

    pub fn stack_size(&self) -> usize { self.k }

    pub fn inner(&self) -> &E { &self.inner }
    pub fn inner_mut(&mut self) -> &mut E { &mut self.inner }
    pub fn into_inner(self) -> E { self.inner }

    fn stacked(&self) -> Vec<E::Obs> {
        self.frames.iter().cloned().collect()
    }
}

impl<E> Env for FrameStack<E>
where
    E: Env,
    E::Obs: Clone,
{
    type Obs = Vec<E::Obs>;
    type Act = E::Act;

    fn reset(&mut self) -> Self::Obs {
        let obs = self.inner.reset();
        self.frames.clear();
        self.frames.extend(std::iter::repeat_n(obs, self.k));
        self.stacked()
    }

    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
        if self.frames.len() != self.k {
            return Err(VecEnvError::NotReady("call reset before stepping a frame stack".into()));
        }
        let s = self.inner.step(action)?;
        self.frames.pop_front();
        self.frames.push_back(s.observation);
        Ok(Step::new(self.stacked(), s.reward, s.done, s.info))
    }

    fn seed(&mut self, seed: Option<u64>) { self.inner.seed(seed) }
    fn render(&self) -> Option<RenderFrame> { self.inner.render() }
    fn close(&mut self) { self.inner.close() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::CounterEnv;

    #[test]
    fn window_follows_counter_trajectory() {
        let mut fs = FrameStack::new(CounterEnv::new(10), 4).unwrap();
        fs.seed(None);
        assert_eq!(fs.reset(), vec![0, 0, 0, 0]);

        let mut obs = Vec::new();
        for _ in 0..5 {
            obs = fs.step(1).unwrap().observation;
        }
        assert_eq!(obs, vec![2, 3, 4, 5]);

        for _ in 0..10 {
            obs = fs.step(0).unwrap().observation;
        }
        assert_eq!(obs, vec![0, 0, 0, 0]);

        let mut last = None;
        for _ in 0..9 {
            last = Some(fs.step(1).unwrap());
        }
        let s = last.unwrap();
        assert_eq!(s.observation, vec![6, 7, 8, 9]);
        assert_eq!((s.reward, s.done), (0.0, false));

        let s = fs.step(1).unwrap();
        assert_eq!(s.observation, vec![7, 8, 9, 10]);
        assert_eq!((s.reward, s.done), (1.0, true));

        let err = fs.step(0).unwrap_err();
        assert!(matches!(err, VecEnvError::StepAfterDone));
        fs.close();
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(FrameStack::new(CounterEnv::new(3), 0), Err(VecEnvError::InvalidArgument(_))));
    }

    #[test]
    fn step_before_reset_is_not_ready() {
        let mut fs = FrameStack::new(CounterEnv::new(3), 2).unwrap();
        assert!(matches!(fs.step(1), Err(VecEnvError::NotReady(_))));
    }

    #[test]
    fn failed_step_leaves_window_untouched() {
        let mut fs = FrameStack::new(CounterEnv::new(3), 3).unwrap();
        fs.reset();
        fs.step(1).unwrap();
        assert!(fs.step(9).is_err());
        let s = fs.step(1).unwrap();
        assert_eq!(s.observation, vec![0, 1, 2]);
        assert_eq!(fs.inner().index(), 2);
    }
}
