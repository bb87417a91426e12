//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! listener acquisition, dispatcher, forker, shutdown
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → /metrics on the served router (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every state transition and recoverable error gets a log line
//! - Fields carry pids, signals and deadlines so a restart sequence can be
//!   rebuilt from logs alone

pub mod logging;
pub mod metrics;
