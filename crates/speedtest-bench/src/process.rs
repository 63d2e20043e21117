//! Subprocess execution with a watchdog.
//!
//! [`SystemProcessRunner`] polls the child with `try_wait` until a deadline.
//! An unfinished child has not been reaped, so its process group id is still
//! its own when the deadline passes and the group is killed. Two pump threads
//! merge stdout and stderr into one buffer.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Watchdog limit for one native transfer.
pub const NATIVE_TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

/// Upper bound on the `try_wait` back-off, and so on added latency per run.
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A command to run: program, arguments, environment and working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Start from an empty environment instead of inheriting ours.
    pub clear_env: bool,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn clear_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Value of an environment entry, if set.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The command line as a single string, for logs and error reports.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a finished (or killed) subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    /// Interleaved stdout and stderr.
    pub output: String,
    /// The watchdog fired and killed the process.
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }
}

/// Seam over subprocess execution.
pub trait ProcessRunner {
    /// Run `command` to completion, killing it after `timeout`.
    ///
    /// Returns an error only when the process could not be started or
    /// waited on.
    fn run(&self, command: &CommandSpec, timeout: Duration) -> io::Result<ProcessOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, spec: &CommandSpec, timeout: Duration) -> io::Result<ProcessOutput> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if spec.clear_env {
            command.env_clear();
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group so a timeout kill also reaches grandchildren (ssh).
            command.process_group(0);
        }

        let mut child = command.spawn()?;
        let pid = child.id();
        debug!(pid, command = %spec.command_line(), "Spawned subprocess");

        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump(stdout, Arc::clone(&sink)));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump(stderr, Arc::clone(&sink)));
        }

        let waited = wait_with_deadline(&mut child, timeout);
        for handle in pumps {
            let _ = handle.join();
        }
        let (status, timed_out) = waited?;

        let output = match sink.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        };

        Ok(ProcessOutput {
            status: status.code(),
            output,
            timed_out,
        })
    }
}

/// Wait for `child`, killing its process group once `timeout` has passed.
/// Returns the exit status and whether the child was killed.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<(ExitStatus, bool)> {
    let deadline = Instant::now() + timeout;
    let mut interval = Duration::from_millis(1);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        let now = Instant::now();
        if now >= deadline {
            warn!(pid = child.id(), ?timeout, "Subprocess exceeded its time limit, killing it");
            kill_process_group(child.id());
            return Ok((child.wait()?, true));
        }
        thread::sleep(interval.min(deadline - now));
        interval = (interval * 2).min(MAX_POLL_INTERVAL);
    }
}

fn pump(mut reader: impl Read + Send + 'static, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    })
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "PID out of range, cannot kill subprocess");
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        warn!(pid, error = %e, "Failed to kill subprocess group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(pid: u32) {
    warn!(pid, "Killing timed-out subprocesses is only supported on Unix");
}
