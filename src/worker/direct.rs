use std::collections::VecDeque;

use crate::core::{Env, Result, VecEnvError};

use super::{Request, Response, Worker, dispatch};

/// Runs the environment inline on the caller's thread.
///
/// `submit` executes immediately and queues the answer for `collect`, so a
/// batch over direct workers runs sequentially in index order.
pub struct DirectWorker<E: Env> {
    env: E,
    replies: VecDeque<Result<Response<E::Obs>>>,
    closed: bool,
}

impl<E: Env> DirectWorker<E> {
    pub fn new(env: E) -> Self {
        Self { env, replies: VecDeque::new(), closed: false }
    }

    /// Build the environment from a factory; a failing factory is a construction error.
    pub fn spawn<F>(factory: F) -> Result<Self>
    where
        F: FnOnce() -> Result<E>,
    {
        let env = factory().map_err(|e| match e {
            VecEnvError::Construction(m) => VecEnvError::Construction(m),
            other => VecEnvError::Construction(other.to_string()),
        })?;
        Ok(Self::new(env))
    }

    pub fn env(&self) -> &E { &self.env }
}

impl<E: Env> Worker<E::Obs, E::Act> for DirectWorker<E> {
    fn submit(&mut self, request: Request<E::Act>) -> Result<()> {
        if self.closed {
            return Err(VecEnvError::Closed);
        }
        let closing = matches!(request, Request::Close);
        self.replies.push_back(dispatch(&mut self.env, request));
        self.closed = closing;
        Ok(())
    }

    fn collect(&mut self) -> Result<Response<E::Obs>> {
        self.replies
            .pop_front()
            .unwrap_or_else(|| Err(VecEnvError::Other("collect without a pending request".into())))
    }

    fn close(&mut self) {
        if !self.closed {
            self.env.close();
            self.closed = true;
        }
        self.replies.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::CounterEnv;

    #[test]
    fn answers_in_submission_order() {
        let mut w = DirectWorker::new(CounterEnv::new(5));
        w.submit(Request::Reset).unwrap();
        w.submit(Request::Step(1)).unwrap();
        w.submit(Request::Step(1)).unwrap();
        assert_eq!(w.collect().unwrap().into_reset().unwrap(), 0);
        assert_eq!(w.collect().unwrap().into_step().unwrap().observation, 1);
        assert_eq!(w.collect().unwrap().into_step().unwrap().observation, 2);
        assert!(w.collect().is_err());
    }

    #[test]
    fn failing_factory_is_a_construction_error() {
        let err = DirectWorker::<CounterEnv>::spawn(|| Err(VecEnvError::Other("boom".into()))).err().unwrap();
        assert!(matches!(err, VecEnvError::Construction(m) if m.contains("boom")));
    }

    #[test]
    fn requests_after_close_are_rejected() {
        let mut w = DirectWorker::new(CounterEnv::new(5));
        w.close();
        w.close();
        assert!(matches!(w.submit(Request::Reset), Err(VecEnvError::Closed)));
    }
}
