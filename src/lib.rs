//! Zero-downtime process replacement for long-running network servers.
//!
//! A server started through [`lifecycle::serve`] can fork a successor that
//! inherits its listening socket, then drain its own in-flight requests
//! before exiting. Clients never see a refused connection.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ServerConfig;
pub use http::HttpEngine;
pub use lifecycle::{graceful_shutdown, serve, LifecycleError, ServingEngine, Termination};
pub use net::Inheritance;
