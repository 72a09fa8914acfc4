//! Child process execution with streamed protocol parsing.
//!
//! [`run_process`] spawns the command, forwards every `[PROGRESS]:` line
//! into the job's progress log as it arrives, accumulates stderr and waits
//! for the exit. Cancellation kills the child and then still waits for the
//! exit, so no output is forwarded after the job is finalised.

use std::io;
use std::process::Stdio;

use lightbake_jobs::JobContext;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::BakerError;
use crate::outcome::ProcessExit;
use crate::protocol::{parse_line, ProtocolLine};

/// Maximum stderr size kept per process (1 MiB).
///
/// Output past this limit is still drained but no longer recorded.
const MAX_STDERR_BYTES: usize = 1024 * 1024;

const STDERR_CHUNK: usize = 8 * 1024;

/// Longest stdout line parsed (64 KiB). Longer lines are skipped whole.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Run `cmd` to completion on behalf of the job behind `ctx`.
///
/// Returns [`BakerError::Cancelled`] without spawning anything when `cancel`
/// already fired. A cancellation observed while the process runs is
/// reported through [`ProcessExit::cancelled`].
pub async fn run_process(
    mut cmd: Command,
    ctx: &JobContext,
    cancel: &CancellationToken,
) -> Result<ProcessExit, BakerError> {
    let job_id = ctx.id();
    if cancel.is_cancelled() {
        tracing::info!(job_id = %job_id, "Cancelled before start");
        return Err(BakerError::Cancelled);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let mut child = cmd.spawn().map_err(|source| BakerError::Spawn {
        program: program.clone(),
        source,
    })?;
    tracing::info!(job_id = %job_id, program = %program, pid = child.id(), "Process started");

    let stdout_task = tokio::spawn(forward_stdout(child.stdout.take(), ctx.clone()));
    let stderr_task = tokio::spawn(collect_stderr(child.stderr.take(), ctx.clone()));

    let mut cancelled = false;
    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            cancelled = true;
            tracing::info!(job_id = %job_id, "Cancellation requested, killing process");
            if let Err(e) = child.start_kill() {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to signal process");
            }
            child.wait().await
        }
    }?;

    // Drain the pipes so every progress line lands before the outcome.
    let _ = stdout_task.await;
    let errors = stderr_task.await.unwrap_or_default();

    let exit = ProcessExit {
        code: status.code().unwrap_or(-1),
        errors,
        cancelled: cancelled || cancel.is_cancelled(),
    };
    tracing::debug!(job_id = %job_id, code = exit.code, cancelled = exit.cancelled, "Process exited");
    Ok(exit)
}

async fn forward_stdout<R: AsyncRead + Unpin>(stream: Option<R>, ctx: JobContext) {
    let Some(stream) = stream else {
        return;
    };
    let job_id = ctx.id();
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match read_line_capped(&mut reader, &mut buf, MAX_LINE_BYTES).await {
            Ok(0) => break,
            Ok(read) if read > buf.len() => {
                tracing::warn!(job_id = %job_id, bytes = read, "Skipping overlong stdout line");
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                match parse_line(&line) {
                    ProtocolLine::Progress(event) => {
                        tracing::info!(
                            job_id = %job_id,
                            stage = %event.stage,
                            percent = (event.value * 100.0).round(),
                            details = event.details.as_deref().unwrap_or(""),
                            "Progress",
                        );
                        ctx.progress(event);
                    }
                    ProtocolLine::Info(message) => {
                        tracing::info!(job_id = %job_id, "{message}");
                    }
                    ProtocolLine::Other => {
                        tracing::trace!(job_id = %job_id, line = %line.trim_end(), "stdout");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to read stdout");
                break;
            }
        }
    }
}

/// Read one `\n`-terminated line into `buf`, keeping at most `max` bytes.
///
/// The rest of an overlong line is consumed and dropped. Returns the number
/// of bytes taken from the stream, so a result larger than `buf.len()`
/// marks a truncated line and `0` marks end of stream.
async fn read_line_capped<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> io::Result<usize> {
    let mut read = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(read);
        }
        let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (&available[..=end], true),
            None => (available, false),
        };
        let room = max.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        let used = chunk.len();
        reader.consume(used);
        read += used;
        if complete {
            return Ok(read);
        }
    }
}

async fn collect_stderr<R: AsyncRead + Unpin>(stream: Option<R>, ctx: JobContext) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(mut stream) = stream else {
        return errors;
    };
    let job_id = ctx.id();
    let mut kept = 0usize;
    let mut chunk = vec![0u8; STDERR_CHUNK];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let content = String::from_utf8_lossy(&chunk[..n]).into_owned();
                tracing::error!(job_id = %job_id, "{}", content.trim_end());
                if kept < MAX_STDERR_BYTES {
                    kept += content.len();
                    errors.push(content);
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to read stderr");
                break;
            }
        }
    }
    errors
}
