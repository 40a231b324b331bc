//! Invoking the external hardware simulator.
//!
//! The simulator is a black box: it receives a case directory as its last
//! argument, reads the inputs from it, writes its output back into it, and
//! signals success with exit code 0.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tnpu_common::{ExecutionError, Result};
use tracing::{debug, warn};

/// Lines of stdout/stderr kept when a run fails.
pub const OUTPUT_TAIL_LINES: usize = 8;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long output pipes may stay open after the simulator is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Captured result of a successful simulator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorRun {
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub elapsed: Duration,
}

/// Anything that can execute one case directory on the hardware model.
pub trait Simulator: Send + Sync {
    /// Run the simulator on `case_dir`, blocking until it finishes.
    fn run(&self, case_dir: &Path) -> Result<SimulatorRun>;
}

/// Runs an external executable with a wall-clock timeout.
#[derive(Debug, Clone)]
pub struct ProcessSimulator {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ProcessSimulator {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { program: program.into(), args: Vec::new(), timeout }
    }

    /// Extra argument placed before the case directory.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Simulator for ProcessSimulator {
    fn run(&self, case_dir: &Path) -> Result<SimulatorRun> {
        let start = Instant::now();
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(case_dir).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own group, so a timeout also reaches whatever the simulator spawned.
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| ExecutionError::Spawn { program: self.program.clone(), reason: e.to_string() })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // A deadline past the end of `Instant` means no deadline.
        let deadline = start.checked_add(self.timeout);
        let status = wait_with_deadline(&mut child, deadline);
        let grace = Instant::now() + DRAIN_GRACE;
        let stdout_tail = tail_lines(&collect(stdout, grace), OUTPUT_TAIL_LINES);
        let stderr_tail = tail_lines(&collect(stderr, grace), OUTPUT_TAIL_LINES);
        let elapsed = start.elapsed();

        match status {
            Ok(Some(status)) if status.success() => {
                debug!(program = %self.program.display(), elapsed_ms = elapsed.as_millis() as u64, "simulator finished");
                Ok(SimulatorRun { stdout_tail, stderr_tail, elapsed })
            }
            Ok(Some(status)) => {
                warn!(program = %self.program.display(), %status, "simulator failed");
                Err(ExecutionError::NonZeroExit { status: status.to_string(), stdout_tail, stderr_tail }.into())
            }
            Ok(None) => {
                warn!(program = %self.program.display(), timeout_ms = self.timeout.as_millis() as u64, "simulator timed out");
                Err(ExecutionError::Timeout { timeout: self.timeout, stdout_tail, stderr_tail }.into())
            }
            Err(e) => Err(ExecutionError::Spawn { program: self.program.clone(), reason: e.to_string() }.into()),
        }
    }
}

/// Poll until the child exits or the deadline passes; on timeout the child's
/// process group is killed, the child reaped, and `Ok(None)` returned.
fn wait_with_deadline(child: &mut Child, deadline: Option<Instant>) -> std::io::Result<Option<std::process::ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kill_tree(child);
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    match libc::pid_t::try_from(child.id()) {
        // SAFETY: plain syscall on the group the child leads; no memory is shared.
        Ok(pgid) => unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        },
        Err(_) => {
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

type Captured = (Arc<Mutex<Vec<u8>>>, JoinHandle<()>);

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Captured> {
    pipe.map(|mut p| {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let handle = std::thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match p.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut b) => b.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                }
            }
        });
        (buf, handle)
    })
}

/// Output captured so far. Waits for the pipe to close until `grace`; a
/// pipe still held open by a leftover process is abandoned, not joined.
fn collect(captured: Option<Captured>, grace: Instant) -> String {
    let Some((buf, handle)) = captured else {
        return String::new();
    };
    while !handle.is_finished() && Instant::now() < grace {
        std::thread::sleep(POLL_INTERVAL);
    }
    if handle.is_finished() {
        let _ = handle.join();
    }
    let bytes = buf.lock().map(|b| b.clone()).unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Last `n` lines of `text`, without a trailing newline.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
