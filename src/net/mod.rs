//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Process start
//!     → descriptor.rs (inherited payload from the parent, if any)
//!     → listener.rs (adopt inherited socket, or bind fresh)
//!     → transfer.rs (keep a duplicate for future handoffs)
//!     → listener moves into the serving engine
//!     → connection.rs (in-flight tracking while serving)
//! ```
//!
//! # Design Decisions
//! - A failed import is never fatal; a failed bind is
//! - The socket is the only resource shared across generations

pub mod connection;
pub mod descriptor;
pub mod listener;
pub mod transfer;

pub use descriptor::{Inheritance, ListenerDescriptor};
pub use listener::{acquire, ListenerError, ListenerOrigin, ServerListener};
pub use transfer::{HandoffSocket, Transferable, TransferError};
