use std::thread;
use std::time::Duration;

use crate::core::{Env, Info, RenderFrame, Result, Step, VecEnvError};

/// A one-dimensional counter walking from 0 towards `size`.
/// Observation: current index (0..=size)
/// Action space: {0: move back (floored at 0), 1: move forward}
/// Reward: 1 on the transition that reaches `size`, 0 otherwise
///
/// An optional per-step sleep simulates expensive transitions so that
/// out-of-process workers finish in a different order than they were asked.
#[derive(Clone, Debug)]
pub struct CounterEnv {
    size: i64,
    sleep: Duration,
    index: i64,
    done: bool,
}

impl CounterEnv {
    pub fn new(size: i64) -> Self {
        Self { size, sleep: Duration::ZERO, index: 0, done: false }
    }

    /// Sleep for `sleep` before every transition.
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn size(&self) -> i64 { self.size }
    pub fn index(&self) -> i64 { self.index }
    pub fn is_done(&self) -> bool { self.done }
}

impl Env for CounterEnv {
    type Obs = i64;
    type Act = i64;

    fn reset(&mut self) -> Self::Obs {
        self.done = false;
        self.index = 0;
        self.index
    }

    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
        if self.done {
            return Err(VecEnvError::StepAfterDone);
        }
        if !self.sleep.is_zero() {
            thread::sleep(self.sleep);
        }
        if self.index == self.size {
            self.done = true;
            return Ok(Step::new(self.index, 0.0, true, Info::new()));
        }
        match action {
            0 => {
                self.index = (self.index - 1).max(0);
                Ok(Step::new(self.index, 0.0, false, Info::new()))
            }
            1 => {
                self.index += 1;
                self.done = self.index == self.size;
                let reward = if self.done { 1.0 } else { 0.0 };
                Ok(Step::new(self.index, reward, self.done, Info::new()))
            }
            other => Err(VecEnvError::InvalidAction(format!("counter accepts 0 or 1, got {other}"))),
        }
    }

    fn render(&self) -> Option<RenderFrame> {
        Some(RenderFrame::Text(format!("index={}/{}", self.index, self.size)))
    }
}
