// Vectorized environments: one batch call fanned out over N workers.

pub mod backend;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{ProcessConfig, RemoteConfig};
use crate::core::{Env, Info, RenderFrame, Result, Step, VecEnvError};
use crate::utils::rng::split_n;
use crate::worker::{ActorWorker, DirectWorker, ProcessWorker, Request, Response, Worker, WorkerCommand};

/// Seeds for a batch `seed` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Seeds {
    /// Forward `seed(None)` to every environment.
    #[default]
    None,
    /// The same seed for every environment.
    All(u64),
    /// One entry per environment, by index; `None` entries leave that stream alone.
    PerWorker(Vec<Option<u64>>),
    /// Split a root seed into one deterministic sub-seed per environment.
    Derived(u64),
}

impl Seeds {
    /// Resolve to exactly `n` per-worker seeds.
    pub fn resolve(&self, n: usize) -> Result<Vec<Option<u64>>> {
        match self {
            Seeds::None => Ok(vec![None; n]),
            Seeds::All(s) => Ok(vec![Some(*s); n]),
            Seeds::PerWorker(seeds) if seeds.len() == n => Ok(seeds.clone()),
            Seeds::PerWorker(seeds) => Err(VecEnvError::BatchLength { expected: n, got: seeds.len() }),
            Seeds::Derived(root) => Ok(split_n(*root, n).into_iter().map(Some).collect()),
        }
    }
}

impl From<u64> for Seeds { fn from(s: u64) -> Self { Seeds::All(s) } }
impl From<Option<u64>> for Seeds { fn from(s: Option<u64>) -> Self { s.map_or(Seeds::None, Seeds::All) } }
impl From<Vec<u64>> for Seeds { fn from(v: Vec<u64>) -> Self { Seeds::PerWorker(v.into_iter().map(Some).collect()) } }
impl From<Vec<Option<u64>>> for Seeds { fn from(v: Vec<Option<u64>>) -> Self { Seeds::PerWorker(v) } }

/// Index-aligned results of one batch `step`.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchStep<O> {
    pub observations: Vec<O>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub infos: Vec<Info>,
}

impl<O> BatchStep<O> {
    fn with_capacity(n: usize) -> Self {
        Self {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            dones: Vec::with_capacity(n),
            infos: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, step: Step<O>) {
        self.observations.push(step.observation);
        self.rewards.push(step.reward);
        self.dones.push(step.done);
        self.infos.push(step.info);
    }

    pub fn len(&self) -> usize { self.observations.len() }
    pub fn is_empty(&self) -> bool { self.observations.is_empty() }

    /// Slot `i` as a single step.
    pub fn get(&self, i: usize) -> Option<Step<O>>
    where
        O: Clone,
    {
        Some(Step::new(
            self.observations.get(i)?.clone(),
            *self.rewards.get(i)?,
            *self.dones.get(i)?,
            self.infos.get(i)?.clone(),
        ))
    }
}

/// Runs N environments behind one batch API.
///
/// Slot `i` of every batch belongs to worker `i`, in construction order,
/// whatever order the workers answer in. With `reset_after_done` a slot that
/// reports done is reset inside the same `step` call and its observation is
/// replaced by the new episode's first observation (reward and done still
/// describe the terminal transition). Without it, a finished slot gets no more
/// actions until the next `reset`, and repeats its terminal step meanwhile.
///
/// - Direct: `VectorEnv::direct(factories, reset_after_done)`
/// - Child processes: `VectorEnv::subprocess(commands, reset_after_done, &config)`
/// - Actors: `VectorEnv::remote(factories, reset_after_done, &config)`
pub struct VectorEnv<O, A> {
    workers: Vec<Box<dyn Worker<O, A>>>,
    reset_after_done: bool,
    finished: Vec<Option<Step<O>>>,
    closed: bool,
}

impl<O: Clone, A> VectorEnv<O, A> {
    /// Assemble from already started workers.
    pub fn new(workers: Vec<Box<dyn Worker<O, A>>>, reset_after_done: bool) -> Self {
        let finished = vec![None; workers.len()];
        Self { workers, reset_after_done, finished, closed: false }
    }

    /// Workers calling their environments inline, sequentially.
    pub fn direct<E, F>(factories: Vec<F>, reset_after_done: bool) -> Result<Self>
    where
        E: Env<Obs = O, Act = A> + 'static,
        F: FnOnce() -> Result<E>,
    {
        let mut workers: Vec<Box<dyn Worker<O, A>>> = Vec::with_capacity(factories.len());
        for (i, factory) in factories.into_iter().enumerate() {
            workers.push(Box::new(DirectWorker::spawn(factory).map_err(|e| e.at(i))?));
        }
        tracing::debug!(backend = "direct", workers = workers.len(), reset_after_done, "vector env started");
        Ok(Self::new(workers, reset_after_done))
    }

    /// Number of contained environments.
    pub fn len(&self) -> usize { self.workers.len() }
    /// Whether there are no environments.
    pub fn is_empty(&self) -> bool { self.workers.is_empty() }

    pub fn reset_after_done(&self) -> bool { self.reset_after_done }
    pub fn is_closed(&self) -> bool { self.closed }

    /// Reset every environment; returns the initial observations by index.
    pub fn reset(&mut self) -> Result<Vec<O>> {
        self.ensure_open()?;
        let all: Vec<usize> = (0..self.workers.len()).collect();
        let observations = self.reset_slots(&all)?;
        self.finished.iter_mut().for_each(|slot| *slot = None);
        Ok(observations)
    }

    /// Seed every environment: one seed for all, one per index, or derived from a root.
    pub fn seed(&mut self, seeds: impl Into<Seeds>) -> Result<()> {
        self.ensure_open()?;
        let seeds = seeds.into().resolve(self.workers.len())?;
        let requests = seeds.into_iter().map(|s| Some(Request::Seed(s))).collect();
        for response in self.fan_out(requests)?.into_iter().flatten() {
            response.into_seeded()?;
        }
        Ok(())
    }

    /// Step every environment with its action, by index.
    ///
    /// When some slots fail, the slots that succeeded still get their done
    /// bookkeeping (auto-reset or terminal record) before the lowest-index
    /// error is returned.
    pub fn step(&mut self, actions: Vec<A>) -> Result<BatchStep<O>> {
        self.ensure_open()?;
        let n = self.workers.len();
        if actions.len() != n {
            return Err(VecEnvError::BatchLength { expected: n, got: actions.len() });
        }

        // Finished slots (only tracked without auto-reset) are not stepped again.
        let requests = actions
            .into_iter()
            .zip(&self.finished)
            .map(|(action, finished)| finished.is_none().then_some(Request::Step(action)))
            .collect();

        let mut first_error: Option<VecEnvError> = None;
        let mut steps: Vec<Option<Step<O>>> = Vec::with_capacity(n);
        for (i, reply) in self.exchange(requests).into_iter().enumerate() {
            let step = match reply {
                Some(reply) => reply.and_then(|r| r.into_step().map_err(|e| e.at(i))),
                None => self.finished[i]
                    .clone()
                    .ok_or_else(|| VecEnvError::Other(format!("slot {i} lost its terminal step"))),
            };
            match step {
                Ok(step) => steps.push(Some(step)),
                Err(e) => {
                    first_error.get_or_insert(e);
                    steps.push(None);
                }
            }
        }

        let done: Vec<usize> =
            steps.iter().enumerate().filter(|(_, s)| s.as_ref().is_some_and(|s| s.done)).map(|(i, _)| i).collect();
        if self.reset_after_done {
            if !done.is_empty() {
                tracing::trace!(slots = ?done, "auto-resetting finished slots");
                match self.reset_slots(&done) {
                    Ok(fresh) => {
                        for (&i, obs) in done.iter().zip(fresh) {
                            if let Some(step) = steps[i].as_mut() {
                                step.observation = obs;
                            }
                        }
                    }
                    Err(e) => keep_lowest(&mut first_error, e),
                }
            }
        } else {
            for &i in &done {
                if self.finished[i].is_none() {
                    self.finished[i] = steps[i].clone();
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        let mut batch = BatchStep::with_capacity(n);
        for step in steps.into_iter().flatten() {
            batch.push(step);
        }
        Ok(batch)
    }

    /// Render every environment, by index.
    pub fn render(&mut self) -> Result<Vec<Option<RenderFrame>>> {
        self.ensure_open()?;
        let requests = (0..self.workers.len()).map(|_| Some(Request::Render)).collect();
        self.fan_out(requests)?
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.map_or(Ok(None), |r| r.into_rendered().map_err(|e| e.at(i))))
            .collect()
    }

    /// Close every worker. Idempotent and never fails; also runs on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for worker in &mut self.workers {
            worker.close();
        }
        tracing::debug!(workers = self.workers.len(), "vector env closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed { Err(VecEnvError::Closed) } else { Ok(()) }
    }

    /// Reset the given slots in parallel; observations come back in the order of `slots`.
    fn reset_slots(&mut self, slots: &[usize]) -> Result<Vec<O>> {
        let mut requests: Vec<Option<Request<A>>> = (0..self.workers.len()).map(|_| None).collect();
        for &i in slots {
            requests[i] = Some(Request::Reset);
        }
        let mut responses = self.fan_out(requests)?;
        slots
            .iter()
            .map(|&i| match responses[i].take() {
                Some(r) => r.into_reset().map_err(|e| e.at(i)),
                None => Err(VecEnvError::Other(format!("slot {i} was not reset"))),
            })
            .collect()
    }

    /// Submit `requests[i]` to worker `i` (skipping `None`), then collect every
    /// answer, even after a failure, so that no worker is left with an unread
    /// reply. Errors come back attributed to their slot.
    fn exchange(&mut self, requests: Vec<Option<Request<A>>>) -> Vec<Option<Result<Response<O>>>> {
        let mut replies: Vec<Option<Result<Response<O>>>> = Vec::with_capacity(requests.len());
        let mut submitted = Vec::with_capacity(requests.len());
        for (i, (worker, request)) in self.workers.iter_mut().zip(requests).enumerate() {
            match request.map(|r| worker.submit(r)) {
                None => {
                    replies.push(None);
                    submitted.push(false);
                }
                Some(Ok(())) => {
                    replies.push(None);
                    submitted.push(true);
                }
                Some(Err(e)) => {
                    replies.push(Some(Err(e.at(i))));
                    submitted.push(false);
                }
            }
        }

        for (i, (worker, sent)) in self.workers.iter_mut().zip(submitted).enumerate() {
            if sent {
                replies[i] = Some(worker.collect().map_err(|e| e.at(i)));
            }
        }
        replies
    }

    /// [`Self::exchange`], failing with the lowest-index error if any slot failed.
    fn fan_out(&mut self, requests: Vec<Option<Request<A>>>) -> Result<Vec<Option<Response<O>>>> {
        let replies = self.exchange(requests);
        let mut responses = Vec::with_capacity(replies.len());
        let mut first_error: Option<VecEnvError> = None;
        for reply in replies {
            match reply {
                Some(Ok(response)) => responses.push(Some(response)),
                Some(Err(e)) => {
                    first_error.get_or_insert(e);
                    responses.push(None);
                }
                None => responses.push(None),
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(responses),
        }
    }
}

/// Keep whichever of `current` and `candidate` belongs to the lower slot.
fn keep_lowest(current: &mut Option<VecEnvError>, candidate: VecEnvError) {
    let lower = match current {
        Some(prev) => match (candidate.worker_index(), prev.worker_index()) {
            (Some(c), Some(p)) => c < p,
            _ => false,
        },
        None => true,
    };
    if lower {
        *current = Some(candidate);
    }
}

impl<O, A> VectorEnv<O, A>
where
    O: Clone + Send + 'static,
    A: Send + 'static,
{
    /// One actor per environment; environments are built on their actor threads.
    pub fn remote<E, F>(factories: Vec<F>, reset_after_done: bool, config: &RemoteConfig) -> Result<Self>
    where
        E: Env<Obs = O, Act = A> + 'static,
        F: FnOnce() -> Result<E> + Send + 'static,
    {
        let mut workers: Vec<Box<dyn Worker<O, A>>> = Vec::with_capacity(factories.len());
        for (i, factory) in factories.into_iter().enumerate() {
            let worker = ActorWorker::spawn(format!("vecenv-actor-{i}"), factory, config).map_err(|e| e.at(i))?;
            workers.push(Box::new(worker));
        }
        tracing::debug!(backend = "remote", workers = workers.len(), reset_after_done, "vector env started");
        Ok(Self::new(workers, reset_after_done))
    }
}

impl<O, A> VectorEnv<O, A>
where
    O: Clone + DeserializeOwned + 'static,
    A: Serialize + 'static,
{
    /// One child process per environment, started from `commands` in order.
    pub fn subprocess(commands: &[WorkerCommand], reset_after_done: bool, config: &ProcessConfig) -> Result<Self> {
        let mut workers: Vec<Box<dyn Worker<O, A>>> = Vec::with_capacity(commands.len());
        for (i, command) in commands.iter().enumerate() {
            let worker = ProcessWorker::spawn(command, config).map_err(|e| e.at(i))?;
            workers.push(Box::new(worker));
        }
        tracing::debug!(backend = "process", workers = workers.len(), reset_after_done, "vector env started");
        Ok(Self::new(workers, reset_after_done))
    }
}

impl<O, A> Drop for VectorEnv<O, A> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            for worker in &mut self.workers {
                worker.close();
            }
        }
    }
}
