mod clock;
mod network;
mod remote_log;
mod server;
mod signal;
mod supervisor;
mod tls;

use std::path::PathBuf;

use anyhow::Context;
use serbridge_core::config::{ConfigStore, LogSettings, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use clock::SystemClock;
use network::HostNetwork;
use supervisor::Supervisor;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CONFIG: &str = "serbridge.json";

fn print_usage() {
    eprintln!("Usage: serbridge [--config <path>] [--check]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>  Configuration file (default: {DEFAULT_CONFIG})");
    eprintln!("  --check          Validate the configuration, print a summary and exit");
    eprintln!("  --version        Print version and exit");
    eprintln!("  --help           Print this help message");
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Serve(PathBuf),
    Check(PathBuf),
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut check = false;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" => return Ok(Command::Version),
            "--help" => return Ok(Command::Help),
            "--check" => check = true,
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| "--config requires a path".to_string())?;
                config = PathBuf::from(path);
            }
            other => return Err(format!("Unknown option: {other}")),
        }
    }
    Ok(if check {
        Command::Check(config)
    } else {
        Command::Serve(config)
    })
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{message}");
            print_usage();
            std::process::exit(1);
        }
    };

    match command {
        Command::Version => {
            println!("serbridge {}", VERSION);
            Ok(())
        }
        Command::Help => {
            print_usage();
            Ok(())
        }
        Command::Check(path) => {
            let config = load(&ConfigStore::new(path))?;
            print!("{}", summary(&config));
            Ok(())
        }
        Command::Serve(path) => serve(ConfigStore::new(path)),
    }
}

fn load(store: &ConfigStore) -> anyhow::Result<ServerConfig> {
    store
        .load()
        .with_context(|| format!("failed to load configuration {}", store.path().display()))
}

fn serve(store: ConfigStore) -> anyhow::Result<()> {
    let config = load(&store)?;
    init_tracing(config.log_settings());
    info!("serbridge {} starting with {}", VERSION, store.path().display());

    let stop = signal::install().context("failed to install signal handlers")?;
    let mut supervisor =
        Supervisor::new(store, stop, Box::new(SystemClock), Box::new(HostNetwork));
    supervisor.run(config)
}

/// Log to stderr. `RUST_LOG` wins over the configured verbosity.
fn init_tracing(settings: LogSettings) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.default_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn summary(config: &ServerConfig) -> String {
    let mut out = format!(
        "{}: {} bridge(s), verbose {}\n",
        config.name,
        config.bridges.len(),
        if config.log_settings().verbose { "on" } else { "off" }
    );
    for bridge in &config.bridges {
        let mut extras = Vec::new();
        if bridge.ssl.is_some() {
            extras.push("tls");
        }
        if bridge.password().is_some() {
            extras.push("password");
        }
        out.push_str(&format!(
            "  UART {} ({} baud) <-> TCP {}{}\n",
            bridge.uart.port.device_path(),
            bridge.uart.baudrate,
            bridge.tcp.bind,
            if extras.is_empty() {
                String::new()
            } else {
                format!(" [{}]", extras.join(", "))
            }
        ));
    }
    if let Some(syslog) = &config.syslog {
        out.push_str(&format!("  remote log {}:{}\n", syslog.host, syslog.port));
    }
    out
}
