//! External process execution under resource limits.
//!
//! Commands are full shell command lines (templates are shell syntax), run
//! through `/bin/sh -c` in their own process group. Two limits apply:
//!
//! - an address-space ceiling (`RLIMIT_AS`) set in the child before exec;
//! - a wall-clock timeout, after which the whole process group is killed.
//!
//! Standard output is discarded; standard error is captured on a reader
//! thread so a chatty tool can never fill the pipe and stall.

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::debug;
use wait_timeout::ChildExt;

/// How long to wait for stderr once the process is gone.
const STDERR_GRACE: Duration = Duration::from_millis(200);

/// What happened to one external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    /// Exit code; `None` when killed by a signal or the timeout.
    pub code: Option<i32>,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// True when the timeout expired and the process was killed.
    pub timed_out: bool,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    /// Exit code, or -1 when there was none.
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }

    /// Human-readable failure description for error thumbnails.
    pub fn diagnostic(&self, timeout: Duration) -> String {
        let stderr = self.stderr.trim();
        let status = if self.timed_out {
            format!("timed out after {}s", timeout.as_secs())
        } else {
            format!("exit code {}", self.exit_code())
        };
        if stderr.is_empty() {
            status
        } else {
            format!("{stderr} ({status})")
        }
    }
}

/// Run `command` with `/bin/sh -c`.
///
/// `memory_kib == 0` disables the memory ceiling. Returns `Err` only if the
/// shell could not be started or waited on.
pub fn run_shell(command: &str, memory_kib: u64, timeout: Duration) -> io::Result<ShellOutput> {
    debug!("exec (mem {} KiB, timeout {:?}): {}", memory_kib, timeout, command);

    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    isolate(&mut cmd, memory_kib);

    let started = Instant::now();
    let mut child = cmd.spawn()?;
    let stderr_pipe = child.stderr.take();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stderr_pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });

    let (code, timed_out) = match child.wait_timeout(timeout)? {
        Some(status) => {
            // Background jobs left by the tool would hold stderr open.
            kill_leftovers(&child);
            (status.code(), false)
        }
        None => {
            kill_group(&mut child);
            let _ = child.wait();
            (None, true)
        }
    };

    let remaining = timeout.saturating_sub(started.elapsed());
    let stderr = match rx.recv_timeout(remaining.max(STDERR_GRACE)) {
        Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => {
            debug!("stderr still open after exit, giving up on it");
            String::new()
        }
    };

    Ok(ShellOutput {
        code,
        stderr,
        timed_out,
    })
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// New process group plus the memory ceiling.
#[cfg(unix)]
fn isolate(cmd: &mut Command, memory_kib: u64) {
    use std::os::unix::process::CommandExt;

    cmd.process_group(0);
    if memory_kib == 0 {
        return;
    }
    let bytes = memory_kib.saturating_mul(1024) as libc::rlim_t;
    // SAFETY: only async-signal-safe calls between fork and exec.
    unsafe {
        cmd.pre_exec(move || {
            let limit = libc::rlimit {
                rlim_cur: bytes,
                rlim_max: bytes,
            };
            if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command, _memory_kib: u64) {}

#[cfg(unix)]
fn kill_group(child: &mut std::process::Child) {
    // The shell leads its own group, so -pid reaches the tool as well.
    let pid = child.id() as libc::pid_t;
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_group(child: &mut std::process::Child) {
    let _ = child.kill();
}

/// Kill whatever is left in the group of an exited shell.
#[cfg(unix)]
fn kill_leftovers(child: &std::process::Child) {
    let pid = child.id() as libc::pid_t;
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_leftovers(_child: &std::process::Child) {}
