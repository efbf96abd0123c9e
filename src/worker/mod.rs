//! Workers: one environment behind a request/response contract.
//!
//! The vector executor talks to every worker the same way: `submit` a request,
//! later `collect` the answer. How the request travels (inline call, actor
//! mailbox, child process pipe) is private to each implementation, and so is
//! the isolation boundary it owns.

pub mod actor;
pub mod direct;
pub mod process;
pub mod serve;

use serde::{Deserialize, Serialize};

use crate::core::{Env, RenderFrame, Result, Step, VecEnvError};

pub use actor::ActorWorker;
pub use direct::DirectWorker;
pub use process::{ProcessWorker, WorkerCommand};
pub use serve::serve;

/// A request for the environment owned by a worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Request<A> {
    Reset,
    Step(A),
    Seed(Option<u64>),
    Render,
    Close,
}

impl<A> Request<A> {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Reset => "reset",
            Request::Step(_) => "step",
            Request::Seed(_) => "seed",
            Request::Render => "render",
            Request::Close => "close",
        }
    }
}

/// The answer to a [`Request`], same shape whatever the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Response<O> {
    Reset(O),
    Step(Step<O>),
    Seeded,
    Rendered(Option<RenderFrame>),
    Closed,
}

impl<O> Response<O> {
    pub fn into_reset(self) -> Result<O> {
        match self {
            Response::Reset(obs) => Ok(obs),
            other => Err(unexpected("reset", &other)),
        }
    }

    pub fn into_step(self) -> Result<Step<O>> {
        match self {
            Response::Step(step) => Ok(step),
            other => Err(unexpected("step", &other)),
        }
    }

    pub fn into_rendered(self) -> Result<Option<RenderFrame>> {
        match self {
            Response::Rendered(frame) => Ok(frame),
            other => Err(unexpected("render", &other)),
        }
    }

    pub fn into_seeded(self) -> Result<()> {
        match self {
            Response::Seeded => Ok(()),
            other => Err(unexpected("seed", &other)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Response::Reset(_) => "reset",
            Response::Step(_) => "step",
            Response::Seeded => "seeded",
            Response::Rendered(_) => "rendered",
            Response::Closed => "closed",
        }
    }
}

fn unexpected<O>(expected: &str, got: &Response<O>) -> VecEnvError {
    VecEnvError::Transport(format!("expected a {expected} response, got {}", got.kind()))
}

/// Hosts one environment. Requests are answered strictly in submission order.
///
/// `submit` hands a request over without waiting when the transport allows it,
/// so the executor can fan a batch out before collecting any answer.
pub trait Worker<O, A> {
    /// Send a request. Fails only when the request could not be delivered.
    fn submit(&mut self, request: Request<A>) -> Result<()>;

    /// Block for the answer to the oldest outstanding request.
    fn collect(&mut self) -> Result<Response<O>>;

    /// Submit and wait for the answer.
    fn call(&mut self, request: Request<A>) -> Result<Response<O>> {
        self.submit(request)?;
        self.collect()
    }

    /// Release the environment and the isolation boundary. Best effort, idempotent.
    fn close(&mut self);
}

impl<O, A, W: Worker<O, A> + ?Sized> Worker<O, A> for Box<W> {
    fn submit(&mut self, request: Request<A>) -> Result<()> { (**self).submit(request) }
    fn collect(&mut self) -> Result<Response<O>> { (**self).collect() }
    fn close(&mut self) { (**self).close() }
}

/// Apply one request to an environment. Shared by every worker strategy so that
/// responses and error semantics cannot drift between them.
pub(crate) fn dispatch<E: Env>(env: &mut E, request: Request<E::Act>) -> Result<Response<E::Obs>> {
    match request {
        Request::Reset => Ok(Response::Reset(env.reset())),
        Request::Step(action) => env.step(action).map(Response::Step),
        Request::Seed(seed) => {
            env.seed(seed);
            Ok(Response::Seeded)
        }
        Request::Render => Ok(Response::Rendered(env.render())),
        Request::Close => {
            env.close();
            Ok(Response::Closed)
        }
    }
}

/// Error categories that survive a process boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorKind {
    StepAfterDone,
    InvalidAction,
    InvalidArgument,
    NotReady,
    Construction,
    UnknownEnv,
    Other,
}

/// An environment error as written on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: WireErrorKind,
    pub message: String,
}

impl From<&VecEnvError> for WireError {
    fn from(err: &VecEnvError) -> Self {
        let (kind, message) = match err.root_cause() {
            VecEnvError::StepAfterDone => (WireErrorKind::StepAfterDone, String::new()),
            VecEnvError::InvalidAction(m) => (WireErrorKind::InvalidAction, m.clone()),
            VecEnvError::InvalidArgument(m) => (WireErrorKind::InvalidArgument, m.clone()),
            VecEnvError::NotReady(m) => (WireErrorKind::NotReady, m.clone()),
            VecEnvError::Construction(m) => (WireErrorKind::Construction, m.clone()),
            VecEnvError::UnknownEnv(m) => (WireErrorKind::UnknownEnv, m.clone()),
            other => (WireErrorKind::Other, other.to_string()),
        };
        WireError { kind, message }
    }
}

impl From<WireError> for VecEnvError {
    fn from(err: WireError) -> Self {
        match err.kind {
            WireErrorKind::StepAfterDone => VecEnvError::StepAfterDone,
            WireErrorKind::InvalidAction => VecEnvError::InvalidAction(err.message),
            WireErrorKind::InvalidArgument => VecEnvError::InvalidArgument(err.message),
            WireErrorKind::NotReady => VecEnvError::NotReady(err.message),
            WireErrorKind::Construction => VecEnvError::Construction(err.message),
            WireErrorKind::UnknownEnv => VecEnvError::UnknownEnv(err.message),
            WireErrorKind::Other => VecEnvError::Other(err.message),
        }
    }
}

/// One line of worker process output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Frame<O> {
    /// Sent once after the environment was constructed.
    Ready,
    Reply(Response<O>),
    Failed(WireError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::CounterEnv;

    #[test]
    fn dispatch_covers_every_request() {
        let mut env = CounterEnv::new(1);
        assert_eq!(dispatch(&mut env, Request::Reset).unwrap(), Response::Reset(0));
        assert_eq!(dispatch(&mut env, Request::Seed(Some(1))).unwrap(), Response::Seeded);
        let step = dispatch(&mut env, Request::Step(1)).unwrap().into_step().unwrap();
        assert!(step.done);
        assert!(dispatch(&mut env, Request::Step(1)).unwrap_err().is_usage_error());
        assert!(matches!(dispatch(&mut env, Request::Render).unwrap(), Response::Rendered(Some(_))));
        assert_eq!(dispatch(&mut env, Request::Close).unwrap(), Response::Closed);
    }

    #[test]
    fn usage_error_survives_the_wire() {
        let wire = WireError::from(&VecEnvError::StepAfterDone.at(2));
        let text = serde_json::to_string(&Frame::<i64>::Failed(wire)).unwrap();
        let Frame::Failed(back) = serde_json::from_str::<Frame<i64>>(&text).unwrap() else {
            panic!("expected a failure frame");
        };
        assert!(VecEnvError::from(back).is_usage_error());
    }

    #[test]
    fn mismatched_response_is_reported() {
        let err = Response::<i64>::Seeded.into_reset().unwrap_err();
        assert!(matches!(err, VecEnvError::Transport(m) if m.contains("expected a reset")));
    }
}
