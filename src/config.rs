//! Backend configuration.
//!
//! Every config struct has defaults and (de)serializes with serde, so a
//! [`VectorConfig`] can come from a JSON file or from `VECENV_*` environment
//! variables via [`VectorConfig::from_env`].

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Result, VecEnvError};

/// Name of the bundled worker executable.
pub const WORKER_PROGRAM: &str = "vecenv-worker";

// ── RemoteConfig ───────────────────────────────────────────────────

/// Configuration for actor-backed ("remote") workers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// How long to wait for any single answer (including startup) before
    /// failing the call. Default: 30000.
    pub response_timeout_ms: u64,
    /// Bound on queued requests per actor. Default: 16.
    pub mailbox_capacity: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { response_timeout_ms: 30_000, mailbox_capacity: 16 }
    }
}

impl RemoteConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms.max(1))
    }
}

// ── ProcessConfig ──────────────────────────────────────────────────

/// Configuration for child-process workers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Worker executable. `None` = `$VECENV_WORKER_PROGRAM`, else a
    /// `vecenv-worker` next to the current executable.
    pub program: Option<PathBuf>,
    /// Maximum wait for one answer. `None` = wait until the child answers or exits.
    pub response_timeout_ms: Option<u64>,
    /// Time a closing child gets to exit before it is killed. Default (0): 1000.
    pub shutdown_grace_ms: u64,
}

impl ProcessConfig {
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(|ms| Duration::from_millis(ms.max(1)))
    }

    pub fn shutdown_grace(&self) -> Duration {
        match self.shutdown_grace_ms {
            0 => Duration::from_millis(1_000),
            ms => Duration::from_millis(ms),
        }
    }

    /// Resolve the worker executable path.
    pub fn resolved_program(&self) -> Result<PathBuf> {
        if let Some(p) = &self.program {
            return Ok(p.clone());
        }
        if let Some(p) = env::var_os("VECENV_WORKER_PROGRAM") {
            return Ok(PathBuf::from(p));
        }
        let exe = env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| VecEnvError::InvalidArgument(format!("{} has no parent directory", exe.display())))?;
        Ok(dir.join(format!("{WORKER_PROGRAM}{}", env::consts::EXE_SUFFIX)))
    }
}

// ── Backend ────────────────────────────────────────────────────────

/// Which worker transport backs a vector environment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    /// Inline, sequential, no isolation.
    #[default]
    Direct,
    /// One child process per environment.
    Process(ProcessConfig),
    /// One actor (mailbox + dedicated thread) per environment.
    Remote(RemoteConfig),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Direct => "direct",
            Backend::Process(_) => "process",
            Backend::Remote(_) => "remote",
        }
    }
}

// ── VectorConfig ───────────────────────────────────────────────────

/// Everything needed to launch a vector environment besides the env specs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Reset a slot inside the same `step` call that reported done. Default: false.
    pub reset_after_done: bool,
    pub backend: Backend,
}

impl VectorConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Defaults overridden by `VECENV_BACKEND` (`direct` | `process` | `remote`),
    /// `VECENV_RESET_AFTER_DONE`, `VECENV_WORKER_PROGRAM` and `VECENV_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let timeout_ms = var("VECENV_TIMEOUT_MS")
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|e| VecEnvError::InvalidArgument(format!("VECENV_TIMEOUT_MS={v:?}: {e}")))
            })
            .transpose()?;
        let backend = match var("VECENV_BACKEND").as_deref().unwrap_or("direct") {
            "direct" => Backend::Direct,
            "process" => Backend::Process(ProcessConfig {
                program: var("VECENV_WORKER_PROGRAM").map(PathBuf::from),
                response_timeout_ms: timeout_ms,
                ..ProcessConfig::default()
            }),
            "remote" => {
                let mut remote = RemoteConfig::default();
                if let Some(ms) = timeout_ms {
                    remote.response_timeout_ms = ms;
                }
                Backend::Remote(remote)
            }
            other => return Err(VecEnvError::InvalidArgument(format!("unknown VECENV_BACKEND {other:?}"))),
        };
        let reset_after_done = match var("VECENV_RESET_AFTER_DONE").as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(VecEnvError::InvalidArgument(format!("VECENV_RESET_AFTER_DONE={other:?}")));
            }
        };
        Ok(Self { reset_after_done, backend })
    }
}
