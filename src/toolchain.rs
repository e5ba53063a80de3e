//! External toolchain invocation (spec.md §1: "the downstream systems
//! compiler/linker that turns emitted modules into a native binary" is an
//! out-of-scope collaborator; this module is the thin wrapper around it).
//!
//! Grounded on the teacher's own pattern of shelling out to an external
//! tool and inheriting stdio rather than capturing it silently - the same
//! shape `dev_server.rs` used for its child process, generalized here
//! with an explicit kill-on-timeout path since a hung linker must not
//! hang the whole build.

use crate::errors::{EmberError, ErrorKind, Result};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One external toolchain invocation: a binary name plus the arguments
/// this crate assembles around it (input artifact path, output path,
/// target triple). The binary itself is never bundled - spec.md §1 keeps
/// "any downstream native compiler/linker" explicitly out of scope.
pub struct ToolchainInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolchainInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        ToolchainInvocation { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Runs the invocation to completion, inheriting the parent's
    /// stdio so the downstream tool's own diagnostics reach the user
    /// directly (spec.md §7: toolchain failures are reported, not
    /// swallowed).
    pub fn run(&self, cwd: &Path) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| {
                EmberError::new(
                    ErrorKind::Toolchain,
                    format!("launching {}: {e}", self.program),
                )
            })?;
        if !status.success() {
            return Err(EmberError::new(
                ErrorKind::Toolchain,
                format!("{} exited with {status}", self.program),
            ));
        }
        Ok(())
    }

    /// Runs the invocation with a wall-clock timeout: a detached watcher
    /// thread kills the child if it doesn't finish in time, the same
    /// "killer thread gated on a done flag" shape the orchestrator's test
    /// runner uses for per-test timeouts (spec.md §4.7).
    pub fn run_with_timeout(&self, cwd: &Path, timeout: Duration) -> Result<()> {
        let mut child: Child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                EmberError::new(
                    ErrorKind::Toolchain,
                    format!("launching {}: {e}", self.program),
                )
            })?;

        let done = Arc::new(AtomicBool::new(false));
        let done_for_killer = done.clone();
        let pid = child.id();
        let killer = std::thread::spawn(move || {
            std::thread::sleep(timeout);
            if !done_for_killer.load(Ordering::SeqCst) {
                kill_process(pid);
            }
        });

        let wait_result = child.wait();
        done.store(true, Ordering::SeqCst);
        let _ = killer.join();

        let status = wait_result.map_err(|e| {
            EmberError::new(ErrorKind::Toolchain, format!("waiting for {}: {e}", self.program))
        })?;

        if !status.success() {
            if !status.success() && was_probably_killed(&status) {
                return Err(EmberError::new(
                    ErrorKind::Timeout,
                    format!("{} exceeded its {:?} timeout", self.program, timeout),
                ));
            }
            return Err(EmberError::new(
                ErrorKind::Toolchain,
                format!("{} exited with {status}", self.program),
            ));
        }
        Ok(())
    }
}

#[cfg(unix)]
extern "C" {
    fn kill(pid: i32, sig: i32) -> i32;
}

#[cfg(unix)]
fn kill_process(pid: u32) {
    // SAFETY: `pid` came from `Child::id`, a live process we still hold
    // the handle for; sending SIGKILL to it is always valid.
    unsafe {
        kill(pid as i32, 9);
    }
}

#[cfg(not(unix))]
fn kill_process(_pid: u32) {
    // No portable kill-by-pid on this target; the `wait()` above still
    // returns once the process exits on its own.
}

#[cfg(unix)]
fn was_probably_killed(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(9)
}

#[cfg(not(unix))]
fn was_probably_killed(_status: &std::process::ExitStatus) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_invocation_reports_ok() {
        let inv = ToolchainInvocation::new("true");
        assert!(inv.run(Path::new(".")).is_ok());
    }

    #[test]
    fn failing_invocation_reports_toolchain_error() {
        let inv = ToolchainInvocation::new("false");
        let err = inv.run(Path::new(".")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Toolchain);
    }

    #[test]
    fn timeout_kills_a_hanging_process() {
        let inv = ToolchainInvocation::new("sleep").arg("30");
        let err = inv
            .run_with_timeout(Path::new("."), Duration::from_millis(200))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }
}
