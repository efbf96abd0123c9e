//! Worker process for `ProcessWorker`.
//!
//! Builds one built-in environment and serves it on stdin/stdout, one JSON
//! document per line. Logs go to stderr.

use std::io;

use anyhow::{Context, Result};
use clap::Parser;

use rust_vecenv::envs;
use rust_vecenv::registry::EnvSpec;
use rust_vecenv::worker::serve::serve_spec;

#[derive(Parser, Debug)]
#[command(name = "vecenv-worker", about = "Host one environment over a stdio line protocol")]
struct Args {
    /// Registered environment id (e.g. Counter, RandomWalk).
    #[arg(long)]
    env: String,

    /// Construction argument, repeatable: `--kw size=10`.
    #[arg(long = "kw", value_name = "KEY=VALUE", value_parser = parse_kwarg)]
    kwargs: Vec<(String, String)>,

    /// Log verbosity on stderr.
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,
}

fn parse_kwarg(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(args.log_level)
        .init();

    let spec = EnvSpec { id: args.env, kwargs: args.kwargs.into_iter().collect() };
    tracing::info!(env = %spec.id, pid = std::process::id(), "worker starting");

    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    serve_spec(&envs::builtin(), &spec, stdin, stdout).with_context(|| format!("serving {}", spec.id))?;
    Ok(())
}
