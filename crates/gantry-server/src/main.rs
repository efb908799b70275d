use std::{
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

use clap::Parser;
use gantry_server::{Server, ServerConfig};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "gantryd", about = "Industrial automation protocol server")]
struct Args {
    /// Path to a JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listener port override.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> ExitCode {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=debug gantryd
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => match ServerConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                error!(?path, %err, "could not load configuration");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    let stop = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        if let Err(err) = signal_hook::flag::register(sig, Arc::clone(&stop)) {
            error!(sig, %err, "could not register signal handler");
            return ExitCode::FAILURE;
        }
    }

    let mut server = match Server::new(config) {
        Ok(server) => server,
        Err(err) => {
            error!(%err, "could not set up server");
            return ExitCode::FAILURE;
        }
    };
    if server.bind().is_err() {
        return ExitCode::FAILURE;
    }

    server.add_repeated_callback(
        Duration::from_secs(2),
        Box::new(|| info!("server heartbeat")),
    );

    match server.run(&stop) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "server loop failed");
            ExitCode::FAILURE
        }
    }
}
