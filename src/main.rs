//! rawecho CLI

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use rawecho::config::Config;
use rawecho::network::NetworkHandler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Default, PartialEq, Eq)]
struct CliOptions {
    config: Option<PathBuf>,
    port: Option<u16>,
    print_request: bool,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(message) => {
            eprintln!("{message}");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = run(options).await {
        eprintln!("rawecho: {e:#}");
        process::exit(1);
    }
}

async fn run(options: CliOptions) -> anyhow::Result<()> {
    let mut config = match &options.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(port) = options.port {
        config.port = port;
    }
    config.print_request |= options.print_request;
    config.validate()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    NetworkHandler::new(config)
        .run()
        .await
        .context("listener failed")
}

fn parse_args(args: &[String]) -> Result<Option<CliOptions>, String> {
    let mut options = CliOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-c" | "--config" => {
                let path = iter.next().ok_or("--config requires a path")?;
                options.config = Some(PathBuf::from(path));
            }
            "-p" | "--port" => {
                let port = iter.next().ok_or("--port requires a value")?;
                let port = port
                    .parse()
                    .map_err(|e| format!("Invalid port '{port}': {e}"))?;
                options.port = Some(port);
            }
            "--print-request" => options.print_request = true,
            other => return Err(format!("Unknown argument: {other}")),
        }
    }

    Ok(Some(options))
}

fn print_usage() {
    eprintln!("rawecho v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: rawecho [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <path>   Load settings from a TOML file");
    eprintln!("  -p, --port <port>     Port to listen on (default 5003)");
    eprintln!("      --print-request   Log every recorded request");
    eprintln!("  -h, --help            Show this message");
    eprintln!();
    eprintln!("Log verbosity follows RUST_LOG, e.g. RUST_LOG=rawecho=debug");
}
