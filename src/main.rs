//! Binary entrypoint for the relaytwin CLI.
//!
//! Commands:
//! - `run [--port <path>] [--no-sim]` - robot telemetry dashboard
//! - `debug [--port <path>]` - line-follower debug dashboard with calibration
//! - `init` - write a starter `config.toml`
//! - `ports` - list serial ports and the one auto-detection would pick
//!
//! See the library crate docs for module-level details: `relaytwin::`.
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use relaytwin::api::{DebugApi, StatusFile, TelemetryApi};
use relaytwin::calibration::DebugState;
use relaytwin::config::Config;
use relaytwin::console;
use relaytwin::link::{CommandChannel, Connector, SerialLink, TelemetryIngest, TransportSlot};
use relaytwin::simulator::Simulator;
use relaytwin::store::DeviceStore;

#[derive(Parser)]
#[command(name = "relaytwin")]
#[command(about = "Digital twin dashboards for serial-linked line-following robots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the robot telemetry dashboard
    Run {
        /// Serial port of the radio bridge (e.g., /dev/ttyUSB0, or "auto")
        #[arg(short, long)]
        port: Option<String>,

        /// Disable simulated robots
        #[arg(long)]
        no_sim: bool,
    },
    /// Run the line-follower debug dashboard
    Debug {
        /// Serial port of the follower (defaults to auto-detection)
        #[arg(short, long)]
        port: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// List serial ports
    Ports,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.command {
        Commands::Init => None,
        _ => Some(load_config(&cli.config).await?),
    };
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Run { port, no_sim } => {
            let mut config = config.unwrap_or_default();
            if let Some(port) = port {
                config.serial.port = port;
            }
            if no_sim {
                config.simulator.enabled = false;
            }
            config.validate()?;
            run_dashboard(config).await
        }
        Commands::Debug { port } => {
            let mut config = config.unwrap_or_default();
            if let Some(port) = port {
                config.serial.port = port;
            }
            config.validate()?;
            run_debug(config).await
        }
        Commands::Init => {
            if Path::new(&cli.config).exists() {
                bail!("{} already exists; not overwriting", cli.config);
            }
            Config::create_default(&cli.config).await?;
            println!("Wrote default configuration to {}", cli.config);
            Ok(())
        }
        Commands::Ports => list_ports(),
    }
}

/// Missing file means defaults; a broken file is an error.
async fn load_config(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        eprintln!("{} not found, using defaults (run `relaytwin init` to create one)", path);
        return Ok(Config::default());
    }
    Config::load(path).await
}

#[cfg(feature = "serial")]
fn connector(config: &Config) -> Result<Box<dyn Connector>> {
    Ok(Box::new(relaytwin::link::SerialConnector::new(
        config.serial.port.clone(),
        config.serial.baud_rate,
    )))
}

#[cfg(not(feature = "serial"))]
fn connector(_config: &Config) -> Result<Box<dyn Connector>> {
    bail!("built without the `serial` feature; no serial transport available")
}

#[cfg(feature = "serial")]
fn list_ports() -> Result<()> {
    let ports = relaytwin::link::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    let chosen = relaytwin::link::pick_port(&ports).map(|p| p.name.clone());
    for port in &ports {
        let marker = if Some(&port.name) == chosen.as_ref() { "*" } else { " " };
        println!("{} {:<24} {}", marker, port.name, port.description);
    }
    if chosen.is_some() {
        println!("(* = auto-detect choice)");
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn list_ports() -> Result<()> {
    bail!("built without the `serial` feature")
}

/// Park until Ctrl-C unless the operator already quit from the console.
async fn wait_for_exit(quit_from_console: bool) -> Result<()> {
    if !quit_from_console {
        info!("Console input closed; press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
    }
    info!("Shutting down");
    Ok(())
}

async fn run_dashboard(config: Config) -> Result<()> {
    info!("Starting relaytwin v{} (telemetry)", env!("CARGO_PKG_VERSION"));
    let store = Arc::new(DeviceStore::new(config.device_set(), config.store_settings()));
    let slot = TransportSlot::new();

    let link = SerialLink::new(
        connector(&config)?,
        slot.clone(),
        Arc::new(TelemetryIngest::new(store.clone())),
        config.link_settings(),
    );
    tokio::spawn(link.run());

    if config.simulator.enabled {
        let sim = Simulator::new(
            store.clone(),
            &config.simulator.devices,
            Duration::from_millis(config.simulator.interval_ms),
        );
        tokio::spawn(sim.run());
    }

    let commands =
        CommandChannel::new(store.clone(), slot.clone()).with_broadcast_gap(config.broadcast_gap());
    let api = TelemetryApi::new(store, commands, slot);

    if let Some(file) = &config.status.file {
        let writer = StatusFile::new(file, Duration::from_millis(config.status.interval_ms));
        let snapshot_api = api.clone();
        info!("Writing status snapshots to {}", writer.path().display());
        tokio::spawn(writer.run(move || snapshot_api.status()));
    }

    println!("relaytwin ready. Type `help` for commands.");
    let quit = tokio::select! {
        quit = console::run_telemetry_console(api) => quit,
        r = tokio::signal::ctrl_c() => { r?; true }
    };
    wait_for_exit(quit).await
}

async fn run_debug(config: Config) -> Result<()> {
    info!("Starting relaytwin v{} (line-follower debug)", env!("CARGO_PKG_VERSION"));
    let state = Arc::new(DebugState::new());
    let slot = TransportSlot::new();

    let link = SerialLink::new(
        connector(&config)?,
        slot.clone(),
        state.clone(),
        config.link_settings(),
    );
    tokio::spawn(link.run());

    let api = DebugApi::new(state, CommandChannel::raw(slot));
    let poke = config.debug.keepalive_command.clone();
    tokio::spawn(
        api.clone()
            .keepalive(poke.clone(), Duration::from_millis(config.debug.keepalive_ms)),
    );

    if let Some(file) = &config.status.file {
        let writer = StatusFile::new(file, Duration::from_millis(config.status.interval_ms));
        let snapshot_api = api.clone();
        tokio::spawn(writer.run(move || snapshot_api.snapshot()));
    }
    if config.simulator.enabled {
        warn!("Simulator is ignored in debug mode");
    }

    println!("relaytwin debug ready. Type `help` for commands.");
    let quit = tokio::select! {
        quit = console::run_debug_console(api, poke) => quit,
        r = tokio::signal::ctrl_c() => { r?; true }
    };
    wait_for_exit(quit).await
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity beats the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let log_file = config.as_ref().and_then(|c| c.logging.file.clone());
    match log_file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    }) {
        Some(f) => {
            let file = std::sync::Mutex::new(f);
            // Foreground runs echo to the console as well; redirected runs only log to file
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = file.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
