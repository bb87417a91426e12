use clap::{Parser, Subcommand};

use octopus::lifecycle::{send_signal, Signal};

#[derive(Parser)]
#[command(name = "octopus-ctl")]
#[command(about = "Drive a running octopus server through its signals", long_about = None)]
struct Cli {
    /// Process id of the server generation to signal.
    #[arg(short, long)]
    pid: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Fork a successor, then drain and exit (SIGHUP)
    Restart,
    /// Fork a successor and keep serving (SIGUSR1)
    Spawn,
    /// Same as spawn, on the alternate signal (SIGUSR2)
    SpawnAlt,
    /// Drain and exit (SIGTERM)
    Stop,
    /// Drain and exit (SIGINT)
    Interrupt,
}

impl Commands {
    fn signal(self) -> Signal {
        match self {
            Commands::Restart => Signal::Hangup,
            Commands::Spawn => Signal::User1,
            Commands::SpawnAlt => Signal::User2,
            Commands::Stop => Signal::Terminate,
            Commands::Interrupt => Signal::Interrupt,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let signal = cli.command.signal();

    send_signal(cli.pid, signal)
        .map_err(|e| format!("unable to send {} to {}: {}", signal, cli.pid, e))?;

    println!("Sent {} to {}", signal, cli.pid);
    Ok(())
}
