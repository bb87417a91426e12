//! Lifecycle metrics.
//!
//! # Metrics
//! - `octopus_signals_total` (counter): signals received, by signal
//! - `octopus_forks_total` (counter): fork attempts, by outcome
//! - `octopus_shutdowns_total` (counter): shutdowns, by outcome
//! - `octopus_in_flight_requests` (gauge): requests being served
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; cheap no-ops without a recorder
//! - Exposition rides on the served listener, so it is handed off with it

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle that renders it.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn record_signal(signal: &'static str) {
    ::metrics::counter!("octopus_signals_total", "signal" => signal).increment(1);
}

pub fn record_fork(outcome: &'static str) {
    ::metrics::counter!("octopus_forks_total", "outcome" => outcome).increment(1);
}

pub fn record_shutdown(outcome: &'static str) {
    ::metrics::counter!("octopus_shutdowns_total", "outcome" => outcome).increment(1);
}

pub fn set_in_flight(count: u64) {
    ::metrics::gauge!("octopus_in_flight_requests").set(count as f64);
}
