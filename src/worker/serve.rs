//! Worker-process side of the line protocol.

use std::io::{BufRead, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::{Env, Result, VecEnvError};
use crate::registry::{EnvSpec, Registry};

use super::{Frame, Request, WireError, WireErrorKind, dispatch};

/// Write one frame as a JSON line and flush it.
pub fn write_frame<O: Serialize, W: Write>(output: &mut W, frame: &Frame<O>) -> Result<()> {
    serde_json::to_writer(&mut *output, frame)?;
    output.write_all(b"\n")?;
    output.flush()?;
    Ok(())
}

/// Host `env` on `input`/`output` until a `Close` request or end of input.
///
/// Announces itself with a `Ready` frame, then answers every request line with
/// exactly one frame. Environment errors are answered, not fatal; only I/O
/// failures end the loop early.
pub fn serve<E, R, W>(mut env: E, input: R, mut output: W) -> Result<()>
where
    E: Env,
    E::Obs: Serialize,
    E::Act: DeserializeOwned,
    R: BufRead,
    W: Write,
{
    write_frame(&mut output, &Frame::<E::Obs>::Ready)?;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Request<E::Act> = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                let failure = WireError { kind: WireErrorKind::Other, message: format!("malformed request: {e}") };
                write_frame(&mut output, &Frame::<E::Obs>::Failed(failure))?;
                continue;
            }
        };
        let closing = matches!(request, Request::Close);
        tracing::trace!(request = request.name(), "handling request");
        let frame = match dispatch(&mut env, request) {
            Ok(response) => Frame::Reply(response),
            Err(e) => Frame::Failed(WireError::from(&e)),
        };
        write_frame(&mut output, &frame)?;
        if closing {
            tracing::debug!("closed by parent");
            return Ok(());
        }
    }
    tracing::debug!("input closed; shutting down");
    env.close();
    Ok(())
}

/// Build `spec` from `registry` and serve it. A construction failure is
/// reported to the parent as a `Failed` frame and returned.
pub fn serve_spec<E, R, W>(registry: &Registry<E>, spec: &EnvSpec, input: R, mut output: W) -> Result<()>
where
    E: Env + 'static,
    E::Obs: Serialize,
    E::Act: DeserializeOwned,
    R: BufRead,
    W: Write,
{
    let env = match registry.make(spec) {
        Ok(env) => env,
        Err(e) => {
            let e = match e {
                VecEnvError::UnknownEnv(_) | VecEnvError::Construction(_) => e,
                other => VecEnvError::Construction(other.to_string()),
            };
            write_frame(&mut output, &Frame::<E::Obs>::Failed(WireError::from(&e)))?;
            return Err(e);
        }
    };
    tracing::debug!(env = %spec.id, kwargs = ?spec.kwargs, "serving environment");
    serve(env, input, output)
}
