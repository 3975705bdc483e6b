//! minilink monitor
//!
//! Command-line host for Monoprice Select Mini V2 printers.

mod commands;
mod config;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use minilink_protocol::HeaterKind;
use tracing_subscriber::EnvFilter;

use commands::{Monitor, PrintAction};
use config::{MonitorConfig, default_config_path};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file [default: ~/.config/minilink/monitor.toml]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Follow stored printers and print their events
    Watch {
        /// Extra addresses to probe and store
        addresses: Vec<String>,
        /// Create a machine for each added printer and keep only the active one connected
        #[arg(long)]
        select: bool,
    },
    /// Probe a printer and store its address
    Add { address: String },
    /// Forget a stored printer (address or device id)
    Remove { address: String },
    /// Query printers once
    Status { addresses: Vec<String> },
    /// Start printing the loaded model
    Start { address: String },
    /// Pause the running print
    Pause { address: String },
    /// Resume a paused print
    Resume { address: String },
    /// Cancel the running print
    Cancel { address: String },
    /// Set a heater target temperature
    Temp {
        address: String,
        #[arg(value_enum)]
        heater: Heater,
        /// Degrees Celsius
        celsius: String,
    },
    /// Upload a G-code file and print it
    Upload { address: String, file: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Heater {
    Hotend,
    Bed,
}

impl From<Heater> for HeaterKind {
    fn from(heater: Heater) -> Self {
        match heater {
            Heater::Hotend => HeaterKind::Hotend,
            Heater::Bed => HeaterKind::Bed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = MonitorConfig::load_or_create(&config_path)?;
    let monitor = Monitor::new(config, &config_path)?;

    match cli.command {
        Cmd::Watch { addresses, select } => monitor.watch(&addresses, select).await,
        Cmd::Add { address } => monitor.add(&address).await,
        Cmd::Remove { address } => monitor.remove(&address).await,
        Cmd::Status { addresses } => monitor.status(&addresses).await,
        Cmd::Start { address } => monitor.print_action(&address, PrintAction::Start).await,
        Cmd::Pause { address } => monitor.print_action(&address, PrintAction::Pause).await,
        Cmd::Resume { address } => monitor.print_action(&address, PrintAction::Resume).await,
        Cmd::Cancel { address } => monitor.print_action(&address, PrintAction::Cancel).await,
        Cmd::Temp {
            address,
            heater,
            celsius,
        } => {
            monitor
                .set_temperature(&address, heater.into(), &celsius)
                .await
        }
        Cmd::Upload { address, file } => monitor.upload(&address, &file).await,
    }
}
