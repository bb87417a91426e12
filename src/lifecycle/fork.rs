//! Process forker.
//!
//! # Responsibilities
//! - Start a new process image of the running executable
//! - Place the listener at the inheritance slot of the child
//! - Pass the listener descriptor through the environment
//! - Optionally ask the current master to terminate itself
//!
//! # Design Decisions
//! - The parent keeps its listener; both generations accept until the
//!   parent's own shutdown closes it
//! - Master termination is a SIGTERM to ourselves, so it goes through the
//!   dispatcher's graceful path instead of killing abruptly
//! - A failed self-signal fails the fork even though the child is running

use std::ffi::OsString;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command};

use thiserror::Error;

use crate::lifecycle::signals::{send_signal, Signal};
use crate::net::descriptor::{DescriptorError, ListenerDescriptor, INHERITED_FD};
use crate::net::Transferable;
use crate::observability::metrics;

/// Errors raised while forking a child.
#[derive(Debug, Error)]
pub enum ForkError {
    #[error("unsupported listener: {0}")]
    UnsupportedListener(&'static str),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("unable to resolve the running executable: {0}")]
    Executable(#[source] io::Error),

    #[error("executable {0} has no parent directory")]
    WorkingDirectory(PathBuf),

    #[error("unable to start {exe}: {source}")]
    Spawn {
        exe: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The child is running but the master could not be asked to stop.
    #[error("forked child {child_pid} but unable to kill the master ({master_pid}): {source}")]
    KillMaster {
        master_pid: u32,
        child_pid: u32,
        #[source]
        source: io::Error,
    },
}

/// Everything a forker needs to hand the current listener to a successor.
pub struct ForkRequest<'a> {
    pub listener: &'a dyn Transferable,
    pub address: &'a str,
    pub master_pid: u32,
    pub kill_master: bool,
}

/// Spawns successor generations.
pub trait Forker: Send {
    /// Fork a child serving on `request.listener`. Returns the child's pid.
    fn fork(&mut self, request: ForkRequest<'_>) -> Result<u32, ForkError>;
}

/// Forker that re-executes the running binary.
#[derive(Debug, Clone)]
pub struct ProcessForker {
    env_var: String,
    args: Vec<OsString>,
}

impl ProcessForker {
    /// Fork with this process's own arguments.
    pub fn new(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
            args: std::env::args_os().skip(1).collect(),
        }
    }

    /// Replace the arguments passed to children.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Forker for ProcessForker {
    fn fork(&mut self, request: ForkRequest<'_>) -> Result<u32, ForkError> {
        let kind = request.listener.kind();
        let source_fd = request
            .listener
            .transfer_fd()
            .ok_or(ForkError::UnsupportedListener(kind))?
            .as_raw_fd();

        let payload = ListenerDescriptor::new(request.address, kind).encode()?;

        let exe = std::env::current_exe().map_err(ForkError::Executable)?;
        let dir = exe
            .parent()
            .map(PathBuf::from)
            .ok_or_else(|| ForkError::WorkingDirectory(exe.clone()))?;

        let mut command = Command::new(&exe);
        command
            .args(&self.args)
            .current_dir(&dir)
            .env(&self.env_var, &payload);

        // SAFETY: the hook only calls dup2/fcntl, which are async-signal-safe.
        unsafe {
            command.pre_exec(move || inherit_at_slot(source_fd, INHERITED_FD));
        }

        let child = command.spawn().map_err(|source| ForkError::Spawn {
            exe: exe.clone(),
            source,
        })?;
        let child_pid = child.id();

        tracing::info!(
            child_pid,
            master_pid = request.master_pid,
            exe = %exe.display(),
            fd = INHERITED_FD,
            "Forked child"
        );
        reap(child);

        if request.kill_master {
            send_signal(request.master_pid, Signal::Terminate).map_err(|source| {
                ForkError::KillMaster {
                    master_pid: request.master_pid,
                    child_pid,
                    source,
                }
            })?;
            tracing::info!(master_pid = request.master_pid, "Requested master termination");
        } else {
            tracing::info!(master_pid = request.master_pid, "Master is still alive");
        }

        metrics::record_fork("spawned");
        Ok(child_pid)
    }
}

/// Make `source` available at `slot` across exec.
///
/// Runs between fork and exec in the child.
fn inherit_at_slot(source: RawFd, slot: RawFd) -> io::Result<()> {
    if source == slot {
        // dup2 onto itself keeps close-on-exec; clear it by hand.
        let flags = unsafe { libc::fcntl(slot, libc::F_GETFD) };
        if flags < 0 || unsafe { libc::fcntl(slot, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
    } else if unsafe { libc::dup2(source, slot) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Wait for `child` in the background so it never lingers as a zombie.
fn reap(mut child: Child) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("reap-{}", pid))
        .spawn(move || match child.wait() {
            Ok(status) => tracing::info!(child_pid = pid, %status, "Child exited"),
            Err(e) => tracing::warn!(child_pid = pid, error = %e, "Unable to wait for child"),
        });

    if let Err(e) = spawned {
        tracing::warn!(child_pid = pid, error = %e, "Unable to start reaper thread");
    }
}
