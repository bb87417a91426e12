//! Transferable listener descriptors.
//!
//! # Responsibilities
//! - Decide whether a listener can be handed to another process
//! - Keep a duplicate of the serving socket for later handoff
//!
//! # Design Decisions
//! - Capability trait rather than a type switch: each socket type states
//!   whether it exposes a descriptor worth inheriting
//! - Only stream listeners (TCP, unix-domain) are transferable
//! - Duplicates are close-on-exec; the forker places the inherited copy
//!   explicitly in the child

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use thiserror::Error;

/// Errors raised while preparing a listener for handoff.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The listener kind cannot be handed off.
    #[error("unsupported listener: {0}")]
    Unsupported(&'static str),

    /// The descriptor could not be duplicated.
    #[error("unable to duplicate {kind} listener descriptor: {source}")]
    Duplicate {
        kind: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// A socket that may be handed to a child process.
pub trait Transferable {
    /// Short tag naming the socket kind.
    fn kind(&self) -> &'static str;

    /// The descriptor to hand off, or `None` if this kind cannot be inherited.
    fn transfer_fd(&self) -> Option<BorrowedFd<'_>>;
}

impl Transferable for tokio::net::TcpListener {
    fn kind(&self) -> &'static str {
        "tcp"
    }

    fn transfer_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }
}

impl Transferable for tokio::net::UnixListener {
    fn kind(&self) -> &'static str {
        "unix"
    }

    fn transfer_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }
}

impl Transferable for std::net::TcpListener {
    fn kind(&self) -> &'static str {
        "tcp"
    }

    fn transfer_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }
}

impl Transferable for std::os::unix::net::UnixListener {
    fn kind(&self) -> &'static str {
        "unix"
    }

    fn transfer_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }
}

// Datagram sockets have no accept queue to share.
impl Transferable for tokio::net::UdpSocket {
    fn kind(&self) -> &'static str {
        "udp"
    }

    fn transfer_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }
}

/// Duplicate of a serving listener's descriptor.
///
/// The listener itself moves into the serving engine; this copy stays with
/// the process so a child can be forked at any time.
#[derive(Debug)]
pub struct HandoffSocket {
    fd: OwnedFd,
    kind: &'static str,
}

impl HandoffSocket {
    pub fn duplicate<L: Transferable + ?Sized>(listener: &L) -> Result<Self, TransferError> {
        let kind = listener.kind();
        let fd = listener
            .transfer_fd()
            .ok_or(TransferError::Unsupported(kind))?
            .try_clone_to_owned()
            .map_err(|source| TransferError::Duplicate { kind, source })?;

        tracing::debug!(kind, fd = fd.as_raw_fd(), "Duplicated listener descriptor for handoff");
        Ok(Self { fd, kind })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Transferable for HandoffSocket {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn transfer_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.fd.as_fd())
    }
}
