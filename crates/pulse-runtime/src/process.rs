//! Gated process creation in fresh namespaces.
//!
//! The child is cloned straight into its namespaces and blocks on a pipe
//! before re-executing itself. The parent uses that window to write id maps
//! and wire up networking, then releases the child by writing one byte. If
//! the parent drops the gate without releasing, the child reads EOF and
//! exits with [`GATE_ABORTED`].

use std::ffi::CString;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use pulse_common::error::{PulseError, Result};

/// Exit status of a child whose gate closed before release.
pub const GATE_ABORTED: i32 = 125;

/// Exit status of a child whose `execve` failed.
pub const EXEC_FAILED: i32 = 127;

/// Stack reserved for the clone callback.
const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Fully prepared `execve` arguments.
///
/// Everything is converted to C strings before cloning so the child never
/// allocates between clone and exec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Executable to run in the child.
    pub program: CString,
    /// Argument vector, including `argv[0]`.
    pub argv: Vec<CString>,
    /// Complete environment of the child.
    pub envp: Vec<CString>,
    /// Keep the caller's stdin attached.
    pub interactive: bool,
}

impl LaunchRequest {
    /// Builds a request from Rust strings.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] if any value contains a NUL byte.
    pub fn new(program: &Path, argv: &[String], envp: &[String], interactive: bool) -> Result<Self> {
        Ok(Self {
            program: c_string(&program.to_string_lossy())?,
            argv: argv.iter().map(|a| c_string(a)).collect::<Result<_>>()?,
            envp: envp.iter().map(|e| c_string(e)).collect::<Result<_>>()?,
            interactive,
        })
    }
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| PulseError::Config {
        message: format!("argument contains a NUL byte: {value:?}"),
    })
}

/// How a container process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildExit {
    /// Normal exit with the given status.
    Code(i32),
    /// Killed by the named signal.
    Signal(String),
}

impl ChildExit {
    /// Converts the exit into a result, treating status 0 as success.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::ContainerExit`] for a non-zero status and
    /// [`PulseError::ContainerSignaled`] for a signal death.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Code(0) => Ok(()),
            Self::Code(code) => Err(PulseError::ContainerExit { code }),
            Self::Signal(signal) => Err(PulseError::ContainerSignaled { signal }),
        }
    }
}

/// A cloned child waiting on its launch gate.
#[derive(Debug)]
pub struct GatedChild {
    pid: nix::unistd::Pid,
    gate: Option<File>,
    reaped: bool,
}

impl GatedChild {
    /// Host pid of the child.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Lets the child continue to `execve`.
    ///
    /// # Errors
    ///
    /// Returns an error if the gate was already released or the write fails.
    pub fn release(&mut self) -> Result<()> {
        let mut gate = self.gate.take().ok_or_else(|| PulseError::Exec {
            command: self.pid.to_string(),
            message: "launch gate already released".into(),
        })?;
        gate.write_all(&[1]).map_err(|e| PulseError::Exec {
            command: self.pid.to_string(),
            message: format!("failed to release launch gate: {e}"),
        })?;
        tracing::debug!(pid = self.pid(), "launch gate released");
        Ok(())
    }

    /// Waits for the child to terminate.
    ///
    /// # Errors
    ///
    /// Returns an error if `waitpid` fails for a reason other than `EINTR`.
    pub fn wait(&mut self) -> Result<ChildExit> {
        use nix::errno::Errno;
        use nix::sys::wait::{WaitStatus, waitpid};

        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => {
                    self.reaped = true;
                    return Ok(ChildExit::Code(code));
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    self.reaped = true;
                    return Ok(ChildExit::Signal(signal.as_str().to_string()));
                }
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => {
                    return Err(PulseError::Exec {
                        command: self.pid.to_string(),
                        message: format!("waitpid failed: {e}"),
                    });
                }
            }
        }
    }

    /// Kills and reaps the child. Errors are logged.
    pub fn kill(&mut self) {
        if self.reaped {
            return;
        }
        drop(self.gate.take());
        if let Err(e) = nix::sys::signal::kill(self.pid, nix::sys::signal::Signal::SIGKILL) {
            tracing::warn!(pid = self.pid(), error = %e, "failed to kill container process");
        }
        if let Err(e) = self.wait() {
            tracing::warn!(pid = self.pid(), error = %e, "failed to reap container process");
        }
    }
}

impl Drop for GatedChild {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Clones a child into the namespaces given by `flags`, held on a gate.
///
/// The child inherits stdout and stderr. Unless the request is interactive,
/// its stdin is replaced with `/dev/null`.
///
/// # Errors
///
/// Returns an error if the gate pipe cannot be created or `clone(2)` fails,
/// typically for lack of privilege.
pub fn spawn_gated(request: &LaunchRequest, flags: nix::sched::CloneFlags) -> Result<GatedChild> {
    use std::os::fd::AsRawFd;

    use nix::fcntl::OFlag;

    let (gate_read, gate_write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| PulseError::Exec {
        command: request.program.to_string_lossy().into_owned(),
        message: format!("failed to create launch gate: {e}"),
    })?;
    let dev_null = if request.interactive {
        None
    } else {
        Some(File::open("/dev/null").map_err(|e| PulseError::io("/dev/null", e))?)
    };

    let argv: Vec<*const libc::c_char> = request
        .argv
        .iter()
        .map(|a| a.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect();
    let envp: Vec<*const libc::c_char> = request
        .envp
        .iter()
        .map(|e| e.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect();
    let program = request.program.as_ptr();
    let read_fd = gate_read.as_raw_fd();
    let write_fd = gate_write.as_raw_fd();
    let null_fd = dev_null.as_ref().map(AsRawFd::as_raw_fd);

    let child_main = Box::new(move || -> isize {
        // SAFETY: runs in the cloned child with a private copy of the
        // parent's memory; only async-signal-safe libc calls are made and
        // every pointer refers to data prepared before the clone.
        unsafe {
            let _ = libc::close(write_fd);
            let mut byte = 0u8;
            if libc::read(read_fd, (&raw mut byte).cast(), 1) != 1 {
                libc::_exit(GATE_ABORTED);
            }
            let _ = libc::close(read_fd);
            if let Some(fd) = null_fd {
                if libc::dup2(fd, libc::STDIN_FILENO) < 0 {
                    libc::_exit(EXEC_FAILED);
                }
            }
            let _ = libc::execve(program, argv.as_ptr(), envp.as_ptr());
            libc::_exit(EXEC_FAILED)
        }
    });

    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    // SAFETY: no CLONE_VM, so the child runs on a copy of `stack` and of the
    // data the callback borrows; the callback never returns into Rust code.
    let pid = unsafe { nix::sched::clone(child_main, &mut stack, flags, Some(libc::SIGCHLD)) }
        .map_err(|e| PulseError::Exec {
            command: request.program.to_string_lossy().into_owned(),
            message: format!("clone failed: {e}"),
        })?;

    drop(gate_read);
    drop(dev_null);
    tracing::info!(pid = pid.as_raw(), flags = ?flags, "container process cloned");

    Ok(GatedChild {
        pid,
        gate: Some(File::from(gate_write)),
        reaped: false,
    })
}
