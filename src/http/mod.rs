//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! Listener (inherited or fresh)
//!     → server.rs (axum accept loop, in-flight tracking)
//!     → routes.rs (demo handlers, /metrics)
//!     → Send to client
//! ```

pub mod routes;
pub mod server;

pub use routes::demo_router;
pub use server::HttpEngine;
