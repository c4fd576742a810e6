//! Child processes with a timeout, piped text input and bounded output capture.

use std::io::{self, Read, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Stdout as UTF-8 with a single trailing newline (`\n` or `\r\n`) removed.
    pub fn stdout_text(&self) -> Result<String> {
        let text = String::from_utf8(self.stdout.clone()).context("command stdout is not UTF-8")?;
        Ok(strip_trailing_newline(text))
    }

    /// Tail of stderr for error messages.
    pub fn stderr_excerpt(&self, max_chars: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let trimmed = text.trim();
        let count = trimmed.chars().count();
        if count <= max_chars {
            return trimmed.to_string();
        }
        let tail: String = trimmed.chars().skip(count - max_chars).collect();
        format!("...{tail}")
    }
}

fn strip_trailing_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

/// Run `cmd` to completion, feeding `stdin` and capturing stdout/stderr.
///
/// Input is written and output is drained on separate threads so a chatty
/// child can never deadlock against a full pipe. Bytes past
/// `output_limit_bytes` are counted and discarded. On timeout the child is
/// killed and `timed_out` is set.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes = output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
    // Own process group, so a timeout also reaches grandchildren that hold
    // the output pipes open.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|err| {
        error!(err = %err, program = ?cmd.get_program(), "spawn failed");
        anyhow::Error::new(err).context("spawn command")
    })?;
    debug!(pid = child.id(), "child spawned");

    let feeder = match (stdin, child.stdin.take()) {
        (Some(input), Some(pipe)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || feed_stdin(pipe, &input)))
        }
        (Some(_), None) => return Err(anyhow!("child stdin was not captured")),
        (None, _) => None,
    };
    let stdout_reader = spawn_capture(child.stdout.take(), "stdout", output_limit_bytes)?;
    let stderr_reader = spawn_capture(child.stderr.take(), "stderr", output_limit_bytes)?;

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "deadline hit, killing child");
            kill_tree(&mut child)?;
            (child.wait().context("reap killed command")?, true)
        }
    };

    if let Some(feeder) = feeder {
        let fed = feeder
            .join()
            .map_err(|_| anyhow!("stdin writer thread panicked"))?;
        // A child may exit before reading all input; its status decides.
        if let Err(err) = fed {
            debug!(err = %err, "stdin not fully consumed");
        }
    }
    let stdout = finish_capture(stdout_reader, "stdout")?;
    let stderr = finish_capture(stderr_reader, "stderr")?;

    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "output over limit"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, "child finished");

    Ok(CommandOutput {
        status,
        stdout: stdout.kept,
        stderr: stderr.kept,
        stdout_truncated: stdout.dropped,
        stderr_truncated: stderr.dropped,
        timed_out,
    })
}

/// Kill the child's whole process group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> Result<()> {
    let pgid = i32::try_from(child.id()).context("child pid out of range")?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        // Group already gone: the child exited between the wait and the kill.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(anyhow::Error::new(err).context("kill command group")),
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

/// Bytes kept from one stream, plus how many were discarded past the limit.
struct Captured {
    kept: Vec<u8>,
    dropped: usize,
}

fn feed_stdin(mut pipe: ChildStdin, input: &[u8]) -> io::Result<()> {
    pipe.write_all(input)?;
    // Dropping `pipe` here closes it so the child sees EOF.
    Ok(())
}

fn spawn_capture<R>(
    stream: Option<R>,
    name: &'static str,
    limit: usize,
) -> Result<JoinHandle<io::Result<Captured>>>
where
    R: Read + Send + 'static,
{
    let stream = stream.ok_or_else(|| anyhow!("child {name} was not captured"))?;
    Ok(thread::spawn(move || capture(stream, limit)))
}

fn finish_capture(handle: JoinHandle<io::Result<Captured>>, name: &str) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("{name} reader thread panicked"))?
        .with_context(|| format!("read child {name}"))
}

/// Keep the first `limit` bytes of `stream` and drain the rest.
fn capture<R: Read>(mut stream: R, limit: usize) -> io::Result<Captured> {
    let mut kept = Vec::new();
    (&mut stream).take(limit as u64).read_to_end(&mut kept)?;
    let dropped = io::copy(&mut stream, &mut io::sink())?;
    Ok(Captured {
        kept,
        dropped: usize::try_from(dropped).unwrap_or(usize::MAX),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn pipes_stdin_through_to_stdout() {
        let output = run_command_with_timeout(
            Command::new("cat"),
            Some(b"hello\n"),
            Duration::from_secs(10),
            1024,
        )
        .expect("run cat");
        assert!(output.status.success());
        assert!(!output.timed_out);
        assert_eq!(output.stdout_text().expect("utf8"), "hello");
    }

    #[test]
    fn truncates_beyond_limit() {
        let output = run_command_with_timeout(
            sh("printf 'abcdefghij'"),
            None,
            Duration::from_secs(10),
            4,
        )
        .expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
    }

    #[test]
    fn kills_on_timeout() {
        let output =
            run_command_with_timeout(sh("exec sleep 5"), None, Duration::from_millis(100), 1024)
                .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn timeout_kills_grandchildren_holding_the_pipes() {
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 6; echo late"),
            None,
            Duration::from_millis(200),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(output.stdout.is_empty());
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn stderr_excerpt_keeps_the_tail() {
        let output = run_command_with_timeout(
            sh("printf 'first line\\nlast line\\n' >&2; exit 3"),
            None,
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stderr_excerpt(9), "...last line");
        assert_eq!(output.stderr_excerpt(100), "first line\nlast line");
    }

    #[test]
    fn strips_only_one_trailing_newline() {
        assert_eq!(strip_trailing_newline("a\n\n".to_string()), "a\n");
        assert_eq!(strip_trailing_newline("a\r\n".to_string()), "a");
        assert_eq!(strip_trailing_newline("a".to_string()), "a");
    }
}
