use rand::Rng;

use crate::core::{Env, Info, RenderFrame, Result, Step, VecEnvError};
use crate::utils::rng::{RngStream, rng_from_seed};

/// Largest accepted bound; larger requests are clamped.
pub const MAX_BOUND: i64 = 1 << 16;

/// A seeded random walk on the integers.
/// Observation: current position
/// Action space: drift in {-1, 0, 1}, added to a uniform noise term in {-1, 0, 1}
/// Reward: +1 when leaving through `+bound`, -1 through `-bound`, 0 otherwise
///
/// The RNG stream survives `reset`, so consecutive episodes differ while the
/// whole run stays reproducible for a given seed.
pub struct RandomWalkEnv {
    bound: i64,
    position: i64,
    steps: u32,
    done: bool,
    rng: RngStream,
}

impl Default for RandomWalkEnv {
    fn default() -> Self { Self::new(5) }
}

impl RandomWalkEnv {
    pub fn new(bound: i64) -> Self {
        Self { bound: bound.clamp(1, MAX_BOUND), position: 0, steps: 0, done: false, rng: rng_from_seed(0) }
    }

    pub fn bound(&self) -> i64 { self.bound }
}

impl Env for RandomWalkEnv {
    type Obs = i64;
    type Act = i64;

    fn reset(&mut self) -> Self::Obs {
        self.position = 0;
        self.steps = 0;
        self.done = false;
        self.position
    }

    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
        if self.done {
            return Err(VecEnvError::StepAfterDone);
        }
        if !(-1..=1).contains(&action) {
            return Err(VecEnvError::InvalidAction(format!("drift must be -1, 0 or 1, got {action}")));
        }
        let noise: i64 = self.rng.gen_range(-1..=1);
        self.position += action + noise;
        self.steps += 1;
        self.done = self.position.abs() >= self.bound;
        let reward = match (self.done, self.position > 0) {
            (false, _) => 0.0,
            (true, true) => 1.0,
            (true, false) => -1.0,
        };
        let info = Info::new().with("steps", self.steps as i64);
        Ok(Step::new(self.position, reward, self.done, info))
    }

    fn seed(&mut self, seed: Option<u64>) {
        if let Some(s) = seed {
            self.rng = rng_from_seed(s);
        }
    }

    fn render(&self) -> Option<RenderFrame> {
        let width = (2 * self.bound + 1) as usize;
        let mut line = vec!['.'; width];
        let cell = (self.position + self.bound).clamp(0, 2 * self.bound) as usize;
        line[cell] = 'o';
        Some(RenderFrame::Text(line.into_iter().collect()))
    }
}
