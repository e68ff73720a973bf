// src/main.rs

//! The main entry point for the filesvc binary. The same binary runs as
//! either the Name Server (`--nm`) or a Storage Server (the default),
//! picking up its configuration from a TOML file.

use anyhow::Result;
use filesvc::config::{NmConfig, SsConfig};
use std::env;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

/// Looks up `--flag value` in the raw argument list, the same linear scan
/// the teacher's own `--port` override uses.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

/// Parses `--port` as a `u16`, printing a usage error and exiting on a bad
/// value rather than returning `Result` — matching the teacher's own
/// `--port` override, which does the same.
fn port_override(args: &[String]) -> Option<u16> {
    flag_value(args, "--port").map(|raw| match raw.parse::<u16>() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("Invalid port number: {raw}");
            std::process::exit(1);
        }
    })
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("filesvc version {VERSION}");
        return Ok(());
    }

    if args.len() > 1 && args[1] == "--nm" {
        // --- Name Server mode ---

        if args.len() < 3 {
            eprintln!("Usage: filesvc --nm /path/to/nm.toml [--port N] [--host H]");
            std::process::exit(1);
        }
        let config_path = &args[2];

        let mut config = match NmConfig::from_file(config_path).await {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{config_path}\": {e}");
                std::process::exit(1);
            }
        };
        if let Some(port) = port_override(&args) {
            config.port = port;
        }
        if let Some(host) = flag_value(&args, "--host") {
            config.host = host.to_string();
        }

        let log_level =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,filesvc::core::nameserver=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .with_ansi(true)
            .init();

        info!("starting filesvc in name server mode");

        if let Err(e) = filesvc::nameserver::run(config).await {
            error!("name server runtime error: {e}");
            return Err(e);
        }
    } else {
        // --- Storage Server mode ---

        let config_path = flag_value(&args, "--config").unwrap_or("ss.toml");

        let mut config = match SsConfig::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{config_path}\": {e}");
                std::process::exit(1);
            }
        };
        if let Some(port) = port_override(&args) {
            config.client_port = port;
        }
        if let Some(host) = flag_value(&args, "--host") {
            config.host = host.to_string();
        }

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .with_ansi(true)
            .init();

        info!("starting filesvc in storage server mode");

        if let Err(e) = filesvc::storageserver::run(config).await {
            error!("storage server runtime error: {e}");
            return Err(e);
        }
    }

    Ok(())
}
