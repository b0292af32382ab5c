//! Real command execution implementation.

use crate::error::{Error, Result};
use crate::traits::{CommandOutput, CommandRunner};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// ETXTBSY error code (errno 26 on Linux).
/// This error occurs when trying to execute a file that is currently being written.
const ETXTBSY: i32 = 26;

/// How often a timed command is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Spawn a command with retry logic for ETXTBSY errors.
///
/// ETXTBSY ("Text file busy") can occur on overlay filesystems (like Docker)
/// when executing a script that was just created. A brief retry usually
/// succeeds.
fn spawn_with_etxtbsy_retry<F>(mut spawn_fn: F) -> std::io::Result<Child>
where
    F: FnMut() -> std::io::Result<Child>,
{
    loop {
        match spawn_fn() {
            Ok(child) => return Ok(child),
            Err(e) if e.raw_os_error() == Some(ETXTBSY) => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Which pipe a drained buffer came from.
#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Drain a child pipe on a background thread, sending the text when the
/// pipe closes.
///
/// Reading concurrently keeps a chatty child from blocking on a full pipe
/// while we poll it for exit.
fn drain<R>(pipe: Option<R>, stream: Stream, tx: Sender<(Stream, String)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}

/// Put the child in its own process group so the whole tree can be killed.
#[cfg(unix)]
fn isolate_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_command: &mut Command) {}

/// Kill every process in the child's group, then the child itself.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Ok(pgid) = i32::try_from(child.id()) {
            let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Real command runner that executes shell commands.
#[derive(Debug, Default, Clone)]
pub struct RealCommandRunner;

impl RealCommandRunner {
    /// Create a new command runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CommandRunner for RealCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let Some(limit) = timeout else {
            let child = spawn_with_etxtbsy_retry(|| command.spawn())?;
            let output = child.wait_with_output()?;
            return Ok(CommandOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        };

        isolate_process_group(&mut command);
        let mut child = spawn_with_etxtbsy_retry(|| command.spawn())?;

        let (tx, rx) = mpsc::channel();
        drain(child.stdout.take(), Stream::Stdout, tx.clone());
        drain(child.stderr.take(), Stream::Stderr, tx);
        let deadline = Instant::now() + limit;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                kill_tree(&mut child);
                return Err(Error::CommandTimeout {
                    command: std::iter::once(program)
                        .chain(args.iter().copied())
                        .collect::<Vec<_>>()
                        .join(" "),
                    timeout_secs: limit.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let mut output =
            CommandOutput { exit_code: status.code().unwrap_or(-1), ..Default::default() };

        // Background processes the command left behind may still hold the
        // pipes open; they get until the deadline, then their output is dropped.
        for _ in 0..2 {
            let remaining = deadline.saturating_duration_since(Instant::now()).max(POLL_INTERVAL);
            match rx.recv_timeout(remaining) {
                Ok((Stream::Stdout, text)) => output.stdout = text,
                Ok((Stream::Stderr, text)) => output.stderr = text,
                Err(_) => {
                    kill_tree(&mut child);
                    break;
                }
            }
        }

        Ok(output)
    }
}
