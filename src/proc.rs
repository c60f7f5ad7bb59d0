//! Child-process helpers shared by backends and dependency probes.
//!
//! All waits are cancellable: the wait loop polls the execution token and,
//! on cancellation, escalates SIGINT → (5s grace) → SIGKILL before
//! returning. Exit codes follow shell conventions (128 + signal for
//! signal-terminated children).

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::execute::cancel::CancelToken;

/// Grace period between SIGINT and SIGKILL when tearing a child down.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of a cancellable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The child exited on its own.
    Exited(i32),
    /// The token fired and the child was torn down.
    Cancelled,
}

/// Captured output of a probe child.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub code: i32,
    pub stdout: String,
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}

#[cfg(unix)]
fn send_signal(child: &Child, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    let pid = Pid::from_raw(child.id() as i32);
    if let Err(err) = kill(pid, signal) {
        debug!(%pid, ?signal, %err, "Signal delivery failed");
    }
}

/// Interrupt the child, give it `KILL_GRACE` to exit, then kill it.
pub fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        send_signal(child, nix::sys::signal::Signal::SIGINT);
        let deadline = Instant::now() + KILL_GRACE;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    warn!(%err, "try_wait failed during teardown");
                    break;
                }
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Wait for `child`, honoring the cancellation token.
pub fn wait_cancellable(child: &mut Child, cancel: &CancelToken) -> std::io::Result<WaitOutcome> {
    loop {
        if cancel.is_cancelled() {
            terminate(child);
            return Ok(WaitOutcome::Cancelled);
        }
        match child.try_wait()? {
            Some(status) => return Ok(WaitOutcome::Exited(exit_code_of(status))),
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }
}

/// Run a probe command to completion, capturing stdout. Stderr is
/// discarded; stdin is closed. Cancellation tears the child down and
/// reports exit code 130 (interrupted) to the caller.
pub fn run_captured(mut cmd: Command, cancel: &CancelToken) -> std::io::Result<CapturedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    let mut child = cmd.spawn()?;

    // Probes produce tiny output; reading after exit cannot deadlock the
    // pipe for the script sizes involved.
    let outcome = wait_cancellable(&mut child, cancel)?;
    let mut stdout = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        use std::io::Read;
        let _ = pipe.read_to_string(&mut stdout);
    }
    let code = match outcome {
        WaitOutcome::Exited(code) => code,
        WaitOutcome::Cancelled => 130,
    };
    Ok(CapturedOutput { code, stdout })
}
