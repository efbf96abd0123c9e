//! Actor-backed workers.
//!
//! Each environment lives on its own named thread and is reached only through
//! a bounded mailbox; answers come back on a reply channel. The caller never
//! touches the environment, so the actor behaves like a remotely scheduled
//! task: every wait is bounded by `response_timeout`, and an actor that stops
//! answering fails the call instead of hanging it.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::config::RemoteConfig;
use crate::core::{Env, Result, VecEnvError};

use super::{Request, Response, Worker, dispatch};

type Reply<O> = Result<Response<O>>;

pub struct ActorWorker<O, A> {
    name: String,
    mailbox: Option<Sender<Request<A>>>,
    replies: Receiver<Reply<O>>,
    handle: Option<JoinHandle<()>>,
    timeout: Duration,
    broken: bool,
}

impl<O, A> ActorWorker<O, A>
where
    O: Send + 'static,
    A: Send + 'static,
{
    /// Start an actor and build its environment on the actor thread.
    ///
    /// Returns once the factory has finished; a failing factory is reported as
    /// a construction error, a factory that outlives the timeout as `Timeout`.
    pub fn spawn<E, F>(name: impl Into<String>, factory: F, config: &RemoteConfig) -> Result<Self>
    where
        E: Env<Obs = O, Act = A> + 'static,
        F: FnOnce() -> Result<E> + Send + 'static,
    {
        let name = name.into();
        let timeout = config.response_timeout();
        let (mailbox, inbox) = crossbeam_channel::bounded::<Request<A>>(config.mailbox_capacity.max(1));
        let (reply_tx, replies) = crossbeam_channel::unbounded::<Reply<O>>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let mut env = match factory() {
                Ok(env) => env,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if ready_tx.send(Ok(())).is_ok() {
                run(&mut env, &inbox, &reply_tx);
            }
            env.close();
        })?;

        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(match e {
                    VecEnvError::Construction(m) => VecEnvError::Construction(m),
                    other => VecEnvError::Construction(other.to_string()),
                });
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(actor = %name, ?timeout, "actor did not finish construction; detaching");
                return Err(VecEnvError::Timeout(timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                return Err(VecEnvError::Construction(format!("actor {name} panicked while building its environment")));
            }
        }

        tracing::debug!(actor = %name, "actor started");
        Ok(Self { name, mailbox: Some(mailbox), replies, handle: Some(handle), timeout, broken: false })
    }

    pub fn name(&self) -> &str { &self.name }

    fn stopped(&self) -> VecEnvError {
        VecEnvError::Transport(format!("actor {} has stopped", self.name))
    }
}

/// Actor main loop: answer requests in order until `Close` or until the caller goes away.
fn run<E: Env>(env: &mut E, inbox: &Receiver<Request<E::Act>>, replies: &Sender<Reply<E::Obs>>) {
    for request in inbox.iter() {
        let closing = matches!(request, Request::Close);
        if replies.send(dispatch(env, request)).is_err() || closing {
            break;
        }
    }
}

impl<O, A> Worker<O, A> for ActorWorker<O, A>
where
    O: Send + 'static,
    A: Send + 'static,
{
    fn submit(&mut self, request: Request<A>) -> Result<()> {
        if self.broken {
            return Err(self.stopped());
        }
        let mailbox = self.mailbox.as_ref().ok_or(VecEnvError::Closed)?;
        match mailbox.send_timeout(request, self.timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                self.broken = true;
                Err(VecEnvError::Timeout(self.timeout))
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                self.broken = true;
                Err(self.stopped())
            }
        }
    }

    fn collect(&mut self) -> Result<Response<O>> {
        if self.broken {
            return Err(self.stopped());
        }
        match self.replies.recv_timeout(self.timeout) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                // A late answer would pair with the wrong request from now on.
                self.broken = true;
                tracing::warn!(actor = %self.name, timeout = ?self.timeout, "actor timed out");
                Err(VecEnvError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.broken = true;
                Err(self.stopped())
            }
        }
    }

    fn close(&mut self) {
        let Some(mailbox) = self.mailbox.take() else { return };
        let deadline = Instant::now() + self.timeout;
        let mut acknowledged = false;
        if mailbox.send_timeout(Request::Close, self.timeout).is_ok() {
            // Drain answers still in flight, then wait for the close acknowledgement.
            loop {
                let left = deadline.saturating_duration_since(Instant::now());
                match self.replies.recv_timeout(left) {
                    Ok(Ok(Response::Closed)) => {
                        acknowledged = true;
                        break;
                    }
                    Ok(_) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        acknowledged = true;
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => break,
                }
            }
        }
        drop(mailbox);
        match self.handle.take() {
            Some(handle) if acknowledged || handle.is_finished() => {
                let _ = handle.join();
                tracing::debug!(actor = %self.name, "actor closed");
            }
            Some(_) => tracing::warn!(actor = %self.name, "actor busy at close; detaching its thread"),
            None => {}
        }
    }
}

impl<O, A> Drop for ActorWorker<O, A> {
    fn drop(&mut self) {
        if self.mailbox.is_some() {
            // Mailbox drop alone ends the actor loop once it is idle.
            self.mailbox = None;
            if let Some(handle) = self.handle.take() {
                if handle.is_finished() {
                    let _ = handle.join();
                }
            }
        }
    }
}
