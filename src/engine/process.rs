//! Running an engine executable as a child process.
//!
//! The child is spawned with `kill_on_drop(true)` and awaited under the
//! attempt's [`Deadline`]. When the deadline passes the wait future is
//! dropped and tokio kills the process, so an engine can never outlive its
//! request.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::{debug, warn};

use super::Deadline;
use crate::error::ConvertError;
use crate::format::EngineId;

/// Keep this much of stderr in error details.
const STDERR_TAIL: usize = 600;

/// What a finished process printed.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args` and wait for it to exit successfully.
pub async fn run(
    engine: EngineId,
    program: &Path,
    args: &[OsString],
    working_dir: Option<&Path>,
    deadline: Deadline,
) -> Result<ProcessOutput, ConvertError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    debug!(%engine, program = %program.display(), args = ?args, "spawning engine");
    let started = Instant::now();
    let child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            ConvertError::EngineNotFound {
                engine: engine.to_string(),
                detail: format!("cannot execute '{}': {e}", program.display()),
            }
        }
        _ => ConvertError::EngineExecution {
            engine: engine.to_string(),
            detail: format!("spawn failed: {e}"),
        },
    })?;

    let output = deadline
        .run(engine, async {
            child.wait_with_output().await.map_err(|e| ConvertError::EngineExecution {
                engine: engine.to_string(),
                detail: format!("waiting for process failed: {e}"),
            })
        })
        .await
        .inspect_err(|e| {
            if matches!(e, ConvertError::EngineTimeout { .. }) {
                warn!(%engine, budget_s = deadline.budget().as_secs(), "engine timed out; process killed");
            }
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    debug!(
        %engine,
        status = %output.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "engine exited"
    );

    if !output.status.success() {
        return Err(ConvertError::EngineExecution {
            engine: engine.to_string(),
            detail: format!("exited with {}: {}", output.status, tail(&stderr)),
        });
    }
    Ok(ProcessOutput { stdout, stderr })
}

/// Last [`STDERR_TAIL`] bytes of `s`, on a char boundary.
fn tail(s: &str) -> &str {
    let s = s.trim();
    if s.len() <= STDERR_TAIL {
        return s;
    }
    let mut start = s.len() - STDERR_TAIL;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
