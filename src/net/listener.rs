//! Listener acquisition.
//!
//! # Responsibilities
//! - Reconstruct a listener inherited from the parent process
//! - Bind a fresh listener when nothing usable was inherited
//! - Report where the listener came from
//!
//! # Design Decisions
//! - Inheritance problems are never fatal: log and bind fresh
//! - A bind failure is fatal and surfaces to the caller
//! - The inherited slot is checked to be a socket before it is adopted

use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;

use tokio::net::{TcpListener, UnixListener};

use crate::config::Network;
use crate::net::descriptor::{DescriptorError, Inheritance, ListenerDescriptor};
use crate::net::transfer::Transferable;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind a fresh listener.
    Bind {
        address: String,
        source: std::io::Error,
    },
    /// The inherited descriptor record is unusable.
    Descriptor(DescriptorError),
    /// The inherited slot does not hold a socket.
    NotASocket { fd: RawFd, name: String },
    /// The inherited socket could not be turned into a listener.
    Reconstruct { fd: RawFd, source: std::io::Error },
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind { address, source } => {
                write!(f, "Failed to bind {}: {}", address, source)
            }
            ListenerError::Descriptor(e) => write!(f, "{}", e),
            ListenerError::NotASocket { fd, name } => {
                write!(f, "Inherited fd {} ({}) is not a socket", fd, name)
            }
            ListenerError::Reconstruct { fd, source } => {
                write!(f, "Failed to reconstruct listener from fd {}: {}", fd, source)
            }
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind { source, .. } | ListenerError::Reconstruct { source, .. } => {
                Some(source)
            }
            ListenerError::Descriptor(e) => Some(e),
            ListenerError::NotASocket { .. } => None,
        }
    }
}

/// Where an acquired listener came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerOrigin {
    /// Adopted from the parent's descriptor.
    Inherited,
    /// Bound by this process.
    Fresh,
}

/// A bound stream listener, owned by exactly one serving engine at a time.
#[derive(Debug)]
pub enum ServerListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl ServerListener {
    /// Human-readable local address, for logs.
    pub fn local_addr_string(&self) -> String {
        match self {
            ServerListener::Tcp(l) => l
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string()),
            ServerListener::Unix(l) => l
                .local_addr()
                .ok()
                .and_then(|a| a.as_pathname().map(|p| p.display().to_string()))
                .unwrap_or_else(|| "<unnamed>".to_string()),
        }
    }
}

impl Transferable for ServerListener {
    fn kind(&self) -> &'static str {
        match self {
            ServerListener::Tcp(l) => l.kind(),
            ServerListener::Unix(l) => l.kind(),
        }
    }

    fn transfer_fd(&self) -> Option<std::os::fd::BorrowedFd<'_>> {
        match self {
            ServerListener::Tcp(l) => l.transfer_fd(),
            ServerListener::Unix(l) => l.transfer_fd(),
        }
    }
}

/// Produce a listener for `address`, preferring the inherited one.
pub async fn acquire(
    address: &str,
    network: Network,
    inheritance: Inheritance,
) -> Result<(ServerListener, ListenerOrigin), ListenerError> {
    if let Some(payload) = inheritance.take() {
        match import_listener(address, network, &payload) {
            Ok(listener) => {
                tracing::info!(
                    address,
                    local = %listener.local_addr_string(),
                    "Imported a listener from the parent process"
                );
                return Ok((listener, ListenerOrigin::Inherited));
            }
            Err(e) => {
                tracing::warn!(
                    address,
                    error = %e,
                    "Unable to import a listener, creating a new one"
                );
            }
        }
    }

    let listener = bind(address, network).await?;
    tracing::info!(
        address,
        network = %network,
        local = %listener.local_addr_string(),
        "Created a new listener"
    );
    Ok((listener, ListenerOrigin::Fresh))
}

/// Reconstruct the listener described by `payload`.
pub fn import_listener(
    address: &str,
    network: Network,
    payload: &str,
) -> Result<ServerListener, ListenerError> {
    let descriptor = ListenerDescriptor::decode(payload).map_err(ListenerError::Descriptor)?;
    descriptor
        .check_address(address)
        .map_err(ListenerError::Descriptor)?;

    if !is_socket(descriptor.fd) {
        return Err(ListenerError::NotASocket {
            fd: descriptor.fd,
            name: descriptor.name,
        });
    }

    let fd = descriptor.fd;
    let reconstruct = |source| ListenerError::Reconstruct { fd, source };

    // SAFETY: fstat confirmed the slot holds an open socket, and the
    // descriptor record is consumed once, so nothing else here owns it.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };

    let listener = match network {
        Network::Tcp => {
            let std_listener = std::net::TcpListener::from(owned);
            std_listener.set_nonblocking(true).map_err(reconstruct)?;
            // A unix socket in the slot fails here rather than at accept time.
            std_listener.local_addr().map_err(reconstruct)?;
            ServerListener::Tcp(TcpListener::from_std(std_listener).map_err(reconstruct)?)
        }
        Network::Unix => {
            let std_listener = std::os::unix::net::UnixListener::from(owned);
            std_listener.set_nonblocking(true).map_err(reconstruct)?;
            // Rejects sockets of any other family.
            std_listener.local_addr().map_err(reconstruct)?;
            ServerListener::Unix(UnixListener::from_std(std_listener).map_err(reconstruct)?)
        }
    };

    tracing::debug!(fd, name = %descriptor.name, "Reconstructed inherited listener");
    Ok(listener)
}

/// Bind a brand new listener.
pub async fn bind(address: &str, network: Network) -> Result<ServerListener, ListenerError> {
    let bind_error = |source| ListenerError::Bind {
        address: address.to_string(),
        source,
    };

    match network {
        Network::Tcp => TcpListener::bind(address)
            .await
            .map(ServerListener::Tcp)
            .map_err(bind_error),
        Network::Unix => UnixListener::bind(address)
            .map(ServerListener::Unix)
            .map_err(bind_error),
    }
}

/// Validate that a file descriptor is an open socket.
fn is_socket(fd: RawFd) -> bool {
    if fd < 0 {
        return false;
    }
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::fstat(fd, &mut stat) };
    if result != 0 {
        return false;
    }
    (stat.st_mode & libc::S_IFMT) == libc::S_IFSOCK
}

/// Remove a stale unix socket path left by a generation that exited.
///
/// Only removes the path if it is a socket.
pub fn remove_stale_socket(path: &std::path::Path) -> std::io::Result<bool> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            std::fs::remove_file(path)?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
