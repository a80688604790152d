//! atmono-sim: run the simulated monochromator controller on a TCP port.

use std::path::PathBuf;
use std::process::ExitCode;

use atmono_mock::{MockResult, MockServer, SimulationConfig};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated ATMonochromator controller", long_about = None)]
struct Args {
    /// YAML configuration file (controller schema fields plus simulation knobs)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind, overrides the configuration
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overrides the configuration (0 picks a free port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Simulator failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> MockResult<()> {
    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            SimulationConfig::load(path)?
        }
        None => SimulationConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let server = MockServer::start(config).await?;
    info!(host = %server.host(), port = server.port(), "Simulator running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;

    server.stop();
    info!("Simulator stopped");
    Ok(())
}
