//! Child-process workers.
//!
//! The child runs a worker program (see `serve`) that owns the environment.
//! Requests and frames travel as one JSON document per line over the child's
//! stdin/stdout; stderr is inherited so the child's logs reach the terminal.
//! A reader thread forwards stdout lines into a channel, which lets `collect`
//! honour an optional timeout and turns a dead child into a transport error
//! instead of a hang.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ProcessConfig;
use crate::core::{Result, VecEnvError};
use crate::registry::EnvSpec;

use super::{Frame, Request, Response, Worker};

/// Program and arguments that start one worker process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Command line understood by the bundled worker program:
    /// `--env <id> --kw key=value ...`.
    pub fn for_spec(program: impl Into<PathBuf>, spec: &EnvSpec) -> Self {
        let mut cmd = Self::new(program).arg("--env").arg(&spec.id);
        for (k, v) in &spec.kwargs {
            cmd = cmd.arg("--kw").arg(format!("{k}={v}"));
        }
        cmd
    }

    fn display_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

pub struct ProcessWorker<O, A> {
    name: String,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    lines: Receiver<io::Result<String>>,
    reader: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
    grace: Duration,
    broken: bool,
    closed: bool,
    _marker: PhantomData<fn(A) -> O>,
}

impl<O, A> ProcessWorker<O, A>
where
    O: DeserializeOwned,
    A: Serialize,
{
    /// Start the child and wait for its `Ready` frame (or its construction failure).
    pub fn spawn(command: &WorkerCommand, config: &ProcessConfig) -> Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| VecEnvError::Construction(format!("cannot start {}: {e}", command.program.display())))?;
        let name = format!("{}[{}]", command.display_name(), child.id());

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VecEnvError::Transport(format!("{name}: stdio pipes unavailable")));
            }
        };

        let (tx, lines) = crossbeam_channel::unbounded();
        let reader = thread::Builder::new().name(format!("{name}-stdout")).spawn(move || {
            for line in BufReader::new(stdout).lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;

        let mut worker = Self {
            name,
            child,
            stdin: Some(BufWriter::new(stdin)),
            lines,
            reader: Some(reader),
            timeout: config.response_timeout(),
            grace: config.shutdown_grace(),
            broken: false,
            closed: false,
            _marker: PhantomData,
        };

        match worker.read_frame() {
            Ok(Frame::Ready) => {
                tracing::debug!(worker = %worker.name, "worker process ready");
                Ok(worker)
            }
            Ok(Frame::Failed(e)) => {
                worker.close();
                Err(VecEnvError::Construction(VecEnvError::from(e).to_string()))
            }
            Ok(Frame::Reply(_)) => {
                worker.close();
                Err(VecEnvError::Transport(format!("{}: reply before ready", worker.name)))
            }
            Err(e) => {
                worker.close();
                Err(e)
            }
        }
    }

    /// OS process id of the child.
    pub fn id(&self) -> u32 { self.child.id() }

    pub fn name(&self) -> &str { &self.name }

    fn read_frame(&mut self) -> Result<Frame<O>> {
        let received = match self.timeout {
            Some(t) => self.lines.recv_timeout(t),
            None => self.lines.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let line = match received {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                self.broken = true;
                tracing::warn!(worker = %self.name, "worker process timed out");
                return Err(VecEnvError::Timeout(self.timeout.unwrap_or_default()));
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.broken = true;
                return Err(self.exited());
            }
        };
        let line = line.inspect_err(|_| self.broken = true)?;
        serde_json::from_str(&line).map_err(|e| {
            self.broken = true;
            VecEnvError::Transport(format!("{}: malformed frame {line:?}: {e}", self.name))
        })
    }

    /// Describe a child whose output ended.
    fn exited(&mut self) -> VecEnvError {
        match wait_timeout(&mut self.child, self.grace) {
            Some(status) => VecEnvError::Transport(format!("worker process {} exited ({status})", self.name)),
            None => VecEnvError::Transport(format!("worker process {} closed its output", self.name)),
        }
    }
}

impl<O, A> Worker<O, A> for ProcessWorker<O, A>
where
    O: DeserializeOwned,
    A: Serialize,
{
    fn submit(&mut self, request: Request<A>) -> Result<()> {
        if self.closed {
            return Err(VecEnvError::Closed);
        }
        if self.broken {
            return Err(VecEnvError::Transport(format!("worker process {} is unusable", self.name)));
        }
        let stdin = self.stdin.as_mut().ok_or(VecEnvError::Closed)?;
        let written = serde_json::to_writer(&mut *stdin, &request)
            .map_err(io::Error::from)
            .and_then(|()| stdin.write_all(b"\n"))
            .and_then(|()| stdin.flush());
        if let Err(e) = written {
            self.broken = true;
            return Err(match e.kind() {
                io::ErrorKind::BrokenPipe => self.exited(),
                _ => VecEnvError::Transport(format!("{}: cannot send {}: {e}", self.name, request.name())),
            });
        }
        Ok(())
    }

    fn collect(&mut self) -> Result<Response<O>> {
        if self.broken {
            return Err(VecEnvError::Transport(format!("worker process {} is unusable", self.name)));
        }
        match self.read_frame()? {
            Frame::Reply(response) => Ok(response),
            Frame::Failed(e) => Err(e.into()),
            Frame::Ready => {
                self.broken = true;
                Err(VecEnvError::Transport(format!("{}: unexpected ready frame", self.name)))
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut stdin) = self.stdin.take() {
            if !self.broken {
                let _ = serde_json::to_writer(&mut stdin, &Request::<()>::Close);
                let _ = stdin.write_all(b"\n");
                let _ = stdin.flush();
            }
        }
        match wait_timeout(&mut self.child, self.grace) {
            Some(status) => tracing::debug!(worker = %self.name, %status, "worker process exited"),
            None => {
                tracing::warn!(worker = %self.name, grace = ?self.grace, "worker process ignored close; killing");
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
        if let Some(reader) = self.reader.take() {
            if reader.is_finished() {
                let _ = reader.join();
            }
        }
    }
}

impl<O, A> Drop for ProcessWorker<O, A> {
    fn drop(&mut self) {
        if !self.closed {
            self.stdin = None;
            if wait_timeout(&mut self.child, self.grace).is_none() {
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
    }
}

/// Poll `child` until it exits or `limit` elapses.
fn wait_timeout(child: &mut Child, limit: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(5)),
            _ => return None,
        }
    }
}
