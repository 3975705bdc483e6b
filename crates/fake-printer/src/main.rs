use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use minilink_fake_printer::FakePrinter;

/// Emulates the Select Mini V2 HTTP interface.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:80")]
    listen: String,

    /// Seconds between simulation steps (heating, print progress). 0 freezes
    /// the simulated printer.
    #[arg(short, long, default_value_t = 1)]
    tick_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let printer = FakePrinter::bind(args.listen.as_str()).await?;
    if args.tick_secs > 0 {
        printer.run_simulation(Duration::from_secs(args.tick_secs));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = printer.stopped() => {}
    }
    printer.shutdown();
    Ok(())
}
