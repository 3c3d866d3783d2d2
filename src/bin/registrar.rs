//! Registrar server
//!
//! Run with: actorbus-registrar [--port PORT] [--verbose]

use clap::Parser;
use tracing_subscriber::EnvFilter;

use actorbus::address::DEFAULT_REGISTRAR_PORT;
use actorbus::{Context, EnvSettings, RegAddress, RegistrarConfig, RegistrarService, SocketFactory};

#[derive(Parser, Debug)]
#[command(name = "actorbus-registrar")]
#[command(version, about = "Registration and discovery service for actors", long_about = None)]
struct Args {
    /// Port to serve requests on
    #[arg(short, long, default_value_t = DEFAULT_REGISTRAR_PORT)]
    port: u16,

    /// Log every request
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Help and version print to stdout and succeed
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    let settings = EnvSettings::from_env();
    let verbose = args.verbose || settings.registrar_verbose;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(&args, verbose).await {
        tracing::error!(error = %e, "Registrar failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: &Args, verbose: bool) -> actorbus::Result<()> {
    let address = RegAddress::new("localhost", args.port)?;
    let config = RegistrarConfig::new(address).verbose(verbose);
    let factory = SocketFactory::new(Context::new());

    let service = RegistrarService::bind(&factory, config).await?;
    service
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
}
