//! TeleFS Server Binary
//!
//! Accepts client connections and executes their file operations locally,
//! one worker thread per client.
//!
//! # Usage
//!
//! ```bash
//! telefsd [--config server.toml] [--port 20080] [--bind 0.0.0.0] [--log-level info]
//! ```
//!
//! The `serverport15440` environment variable overrides the configured
//! port; the `--port` flag overrides both.

use clap::Parser;
use tracing::{error, info};

use telefs::config::ServerConfig;
use telefs::server::Server;

/// TeleFS remote file-operation server
#[derive(Parser, Debug)]
#[command(name = "telefsd")]
#[command(about = "Executes forwarded file operations on behalf of remote clients")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Listen port (overrides config file and environment)
    #[arg(long)]
    port: Option<u16>,

    /// Bind address (overrides config file)
    #[arg(long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    telefs::logging::init(&args.log_level);

    if let Err(e) = run(&args) {
        error!("server failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::from_env()?,
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.clone();
    }

    info!("telefsd starting on {}:{}", config.bind_addr, config.port);
    let server = Server::bind(&config)?;
    server.run()?;
    Ok(())
}
