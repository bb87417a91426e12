//! Octopus demo server.
//!
//! Serves `/ping` and can be replaced without dropping connections:
//!
//! ```text
//!     kill -HUP  <pid>   fork a successor, then drain and exit
//!     kill -USR1 <pid>   fork a successor, keep serving
//!     kill -TERM <pid>   drain and exit
//! ```
//!
//! A forked successor inherits the listening socket at descriptor 3 and
//! finds its description in the `OCTOPUS_LISTENER` environment variable.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use clap::Parser;

use octopus::config::{self, ConfigError, Network, ServerConfig};
use octopus::http::{demo_router, HttpEngine};
use octopus::lifecycle::{serve_with, ProcessForker};
use octopus::net::Inheritance;
use octopus::observability::{logging, metrics};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8080;

#[derive(Parser, Debug)]
#[command(name = "octopus", version)]
#[command(about = "Ping server with zero-downtime restarts", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to listen on.
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen on a unix-domain socket at this path instead of TCP.
    #[arg(long, conflicts_with_all = ["host", "port"])]
    unix: Option<PathBuf>,

    /// Ask the current master to shut down after each fork.
    #[arg(long)]
    kill_master: bool,

    /// Seconds to wait for in-flight requests on shutdown.
    #[arg(long)]
    shutdown_timeout: Option<u64>,
}

impl Cli {
    /// Make path arguments absolute against the startup directory.
    fn resolve_paths(&mut self) -> io::Result<()> {
        if let Some(path) = &self.config {
            self.config = Some(std::path::absolute(path)?);
        }
        if let Some(path) = &self.unix {
            self.unix = Some(std::path::absolute(path)?);
        }
        Ok(())
    }

    /// Arguments for forked successors, which run from the executable's
    /// directory. Call after [`Cli::resolve_paths`].
    fn child_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(path) = &self.config {
            args.extend(["--config".into(), path.clone().into_os_string()]);
        }
        if let Some(host) = &self.host {
            args.extend(["--host".into(), host.into()]);
        }
        if let Some(port) = self.port {
            args.extend(["--port".into(), port.to_string().into()]);
        }
        if let Some(path) = &self.unix {
            args.extend(["--unix".into(), path.clone().into_os_string()]);
        }
        if self.kill_master {
            args.push("--kill-master".into());
        }
        if let Some(secs) = self.shutdown_timeout {
            args.extend(["--shutdown-timeout".into(), secs.to_string().into()]);
        }
        args
    }

    fn apply(&self, config: &mut ServerConfig) {
        if let Some(path) = &self.unix {
            config.listener.network = Network::Unix;
            config.listener.address = path.to_string_lossy().into_owned();
        } else if self.host.is_some() || self.port.is_some() {
            let (host, port) = split_address(&config.listener.address);
            let host = self.host.clone().unwrap_or(host);
            let port = self.port.unwrap_or(port);
            config.listener.network = Network::Tcp;
            config.listener.address = format!("{}:{}", host, port);
        }

        if self.kill_master {
            config.handoff.kill_master = true;
        }
        if let Some(secs) = self.shutdown_timeout {
            config.shutdown.timeout_secs = secs;
        }
    }
}

/// Host and port of a TCP address, with defaults for the missing parts.
fn split_address(address: &str) -> (String, u16) {
    match address.rsplit_once(':') {
        Some((host, port)) => (
            host.to_string(),
            port.parse().unwrap_or(DEFAULT_PORT),
        ),
        None => (DEFAULT_HOST.to_string(), DEFAULT_PORT),
    }
}

fn load(cli: &Cli) -> Result<ServerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => ServerConfig::default(),
    };
    cli.apply(&mut config);
    config::validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cli = Cli::parse();
    cli.resolve_paths()?;
    let config = load(&cli)?;

    logging::init_logging(&config.logging);
    tracing::info!(
        pid = std::process::id(),
        address = %config.listener.address,
        network = %config.listener.network,
        kill_master = config.handoff.kill_master,
        shutdown_timeout_secs = config.shutdown.timeout_secs,
        "octopus v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let inheritance = Inheritance::from_env(&config.handoff.env_var);

    let metrics_handle = if config.metrics.enabled {
        match metrics::install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Unable to install metrics recorder");
                None
            }
        }
    } else {
        None
    };

    let forker = ProcessForker::new(&config.handoff.env_var).with_args(cli.child_args());
    let engine = HttpEngine::new(demo_router(metrics_handle));
    serve_with(engine, forker, &config, inheritance).await?;
    Ok(())
}
