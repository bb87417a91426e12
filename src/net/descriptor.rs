//! Listener descriptor wire format.
//!
//! # Responsibilities
//! - Describe the listening socket a parent hands to its child
//! - Encode/decode the record carried in a single environment variable
//! - Hold the inherited payload until listener acquisition consumes it
//!
//! # Design Decisions
//! - JSON record with the keys `addr`, `FD` and `Name`
//! - The inherited socket always sits at descriptor 3, right after stdio
//! - The address is a correctness check: a child only adopts a socket
//!   bound to the address it was asked to serve

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable carrying the serialized descriptor by default.
pub const DEFAULT_ENV_VAR: &str = "OCTOPUS_LISTENER";

/// Descriptor slot at which a child finds its inherited listener.
pub const INHERITED_FD: i32 = 3;

/// Errors raised while encoding or decoding a descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The payload is not a valid descriptor record.
    #[error("unable to decode listener descriptor {payload:?}: {source}")]
    Malformed {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    /// The descriptor could not be serialized.
    #[error("unable to encode listener descriptor: {0}")]
    Encode(#[source] serde_json::Error),

    /// The inherited socket belongs to a different address.
    #[error("inherited listener is bound to {inherited}, expected {requested}")]
    AddressMismatch { requested: String, inherited: String },
}

/// Record passed from parent to child describing an inherited listener.
///
/// Valid for exactly one handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerDescriptor {
    /// Address the socket is bound to, as the parent was configured.
    #[serde(rename = "addr")]
    pub address: String,

    /// Descriptor slot in the child.
    #[serde(rename = "FD")]
    pub fd: i32,

    /// Diagnostic tag, `<kind>:<address>`.
    #[serde(rename = "Name")]
    pub name: String,
}

impl ListenerDescriptor {
    /// Describe a listener of the given kind, placed at the inheritance slot.
    pub fn new(address: &str, kind: &str) -> Self {
        Self {
            address: address.to_string(),
            fd: INHERITED_FD,
            name: format!("{}:{}", kind, address),
        }
    }

    pub fn encode(&self) -> Result<String, DescriptorError> {
        serde_json::to_string(self).map_err(DescriptorError::Encode)
    }

    pub fn decode(payload: &str) -> Result<Self, DescriptorError> {
        serde_json::from_str(payload).map_err(|source| DescriptorError::Malformed {
            payload: payload.to_string(),
            source,
        })
    }

    /// Check that this descriptor was issued for `address`.
    pub fn check_address(&self, address: &str) -> Result<(), DescriptorError> {
        if self.address == address {
            Ok(())
        } else {
            Err(DescriptorError::AddressMismatch {
                requested: address.to_string(),
                inherited: self.address.clone(),
            })
        }
    }
}

/// Handoff state a process received from its parent.
///
/// Built once at process start and consumed by listener acquisition.
#[derive(Debug, Clone, Default)]
pub struct Inheritance {
    payload: Option<String>,
}

impl Inheritance {
    /// Nothing inherited: a cold start.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Some(payload.into()),
        }
    }

    /// Read the payload from `var`. An unset or empty variable is a cold start.
    pub fn from_env(var: &str) -> Self {
        Self {
            payload: std::env::var(var).ok().filter(|v| !v.is_empty()),
        }
    }

    pub fn is_present(&self) -> bool {
        self.payload.is_some()
    }

    /// Consume the inheritance, yielding the raw payload if any.
    pub fn take(self) -> Option<String> {
        self.payload
    }
}
