//! Forwarding proxy server
//!
//! Run with: actorbus-proxy [--host HOST] [--port PORT] [--verbose]
//!
//! Binds PORT for publishers, PORT+1 for subscribers and PORT+2 for
//! handshake replies.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use actorbus::address::DEFAULT_PROXY_PORT;
use actorbus::{Context, EnvSettings, Proxy, ProxyAddress, ProxyConfig, SocketFactory};

#[derive(Parser, Debug)]
#[command(name = "actorbus-proxy")]
#[command(version, about = "Topic-addressed pub/sub forwarding proxy", long_about = None)]
struct Args {
    /// Host name or IPv4 address to bind
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Publish port; subscribe and control ports follow it
    #[arg(short, long, default_value_t = DEFAULT_PROXY_PORT)]
    port: u16,

    /// Log every subscription and forwarded message
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
    let verbose = args.verbose || settings.proxy_verbose;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(&args, verbose).await {
        tracing::error!(error = %e, "Proxy failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: &Args, verbose: bool) -> actorbus::Result<()> {
    let address = ProxyAddress::new(&args.host, args.port)?;
    let config = ProxyConfig::new(address).verbose(verbose);
    let factory = SocketFactory::new(Context::new());

    Proxy::new(factory, config)
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
}
