//! Child processes with a deadline and bounded output capture.

use std::io::{ErrorKind, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    /// Bytes kept per stream; the rest is drained and counted.
    pub output_limit_bytes: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_dropped: usize,
    pub stderr_dropped: usize,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Exit code, or -1 when the process was killed by a signal.
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// Run `cmd` to completion or until `limits.timeout`, feeding `stdin` if given.
///
/// Readers drain stdout/stderr on their own threads so a chatty child cannot
/// block on a full pipe. Errors mean the process could not be run at all.
#[instrument(skip_all, fields(timeout_ms = limits.timeout.as_millis() as u64))]
pub fn run_limited(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    limits: ProcessLimits,
) -> Result<ProcessOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let started = Instant::now();
    let mut child = cmd.spawn().context("spawn child process")?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let limit = limits.output_limit_bytes;
    let stdout_reader = thread::spawn(move || read_capped(stdout, limit));
    let stderr_reader = thread::spawn(move || read_capped(stderr, limit));

    if let Some(input) = stdin {
        let mut pipe = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        match pipe.write_all(input) {
            Ok(()) => {}
            // The child may exit without reading its input.
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                debug!("child closed stdin early");
            }
            Err(err) => return Err(err).context("write child stdin"),
        }
    }

    let (status, timed_out) = match child
        .wait_timeout(limits.timeout)
        .context("wait for child process")?
    {
        Some(status) => (status, false),
        None => {
            warn!(
                timeout_ms = limits.timeout.as_millis() as u64,
                "child process timed out, killing"
            );
            child.kill().context("kill child process")?;
            (child.wait().context("reap child process")?, true)
        }
    };

    let (stdout, stdout_dropped) = join_reader(stdout_reader).context("collect stdout")?;
    let (stderr, stderr_dropped) = join_reader(stderr_reader).context("collect stderr")?;
    if stdout_dropped > 0 || stderr_dropped > 0 {
        debug!(stdout_dropped, stderr_dropped, "child output truncated");
    }

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        stdout_dropped,
        stderr_dropped,
        timed_out,
        elapsed: started.elapsed(),
    })
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

fn read_capped(mut reader: impl Read, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read child output")?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        let take = room.min(n);
        kept.extend_from_slice(&chunk[..take]);
        dropped += n - take;
    }
    Ok((kept, dropped))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn limits(timeout_ms: u64, output_limit_bytes: usize) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_millis(timeout_ms),
            output_limit_bytes,
        }
    }

    #[test]
    fn feeds_stdin_and_captures_stdout() {
        let output = run_limited(Command::new("cat"), Some(b"hello\n"), limits(5_000, 1024))
            .expect("run cat");
        assert!(output.status.success());
        assert_eq!(output.stdout_text(), "hello\n");
        assert!(!output.timed_out);
    }

    #[test]
    fn kills_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let output = run_limited(cmd, None, limits(100, 1024)).expect("run sleep");
        assert!(output.timed_out);
        assert!(output.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'abcdefghij'");
        let output = run_limited(cmd, None, limits(5_000, 4)).expect("run sh");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_dropped, 6);
    }

    #[test]
    fn reports_nonzero_exit() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo boom >&2; exit 3");
        let output = run_limited(cmd, None, limits(5_000, 1024)).expect("run sh");
        assert_eq!(output.exit_code(), 3);
        assert_eq!(output.stderr_text(), "boom\n");
    }

    #[test]
    fn missing_binary_is_an_error() {
        let cmd = Command::new("definitely-not-a-real-binary-for-solver-tests");
        assert!(run_limited(cmd, None, limits(1_000, 16)).is_err());
    }
}
