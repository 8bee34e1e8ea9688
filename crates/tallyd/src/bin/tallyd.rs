//! tallyd - TallyArbiter listener daemon
//!
//! Subcommands:
//! - `tallyd run` - Connect and drive the lamps (default)
//! - `tallyd show-config` - Print the effective configuration
//! - `tallyd reset` - Remove the user settings file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tallyconf::{ConfigSources, TallyConfig};
use tallyd::transport;
use tallyd::{ControlLoop, Listener, LoopExit, TracingLamps};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Exit status after a settings reset, so the supervisor restarts us.
const RESET_EXIT_CODE: i32 = 3;

#[derive(Parser)]
#[command(name = "tallyd")]
#[command(about = "TallyArbiter listener driving four tally lights")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./tally-listener.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// TallyArbiter host
    #[arg(long, global = true)]
    host: Option<String>,

    /// TallyArbiter port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the server and drive the lamps
    Run,

    /// Print the effective configuration and where it came from
    ShowConfig,

    /// Remove the user settings file
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = TallyConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            tallyd::telemetry::init(&config.telemetry.log_level)?;
            run(config, &sources).await
        }
        Commands::ShowConfig => {
            show_config(&config, &sources);
            Ok(())
        }
        Commands::Reset => {
            match tallyconf::reset_user_settings()? {
                Some(path) => println!("Removed {}", path.display()),
                None => println!("No user settings to remove"),
            }
            Ok(())
        }
    }
}

fn show_config(config: &TallyConfig, sources: &ConfigSources) {
    if sources.files.is_empty() {
        println!("# no config files found, using defaults");
    }
    for file in &sources.files {
        println!("# loaded {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("# overridden by ${}", var);
    }
    print!("{}", config.to_toml());
}

async fn run(config: TallyConfig, sources: &ConfigSources) -> Result<()> {
    info!("tallyd {} starting", env!("CARGO_PKG_VERSION"));
    for file in &sources.files {
        info!("config: {}", file.display());
    }

    let names = config.listener.display_names();
    for name in &names {
        info!("endpoint: {}", name);
    }

    let listener = Listener::new(names, Instant::now(), config.timing.reconnect_interval());
    let mut control_loop = ControlLoop::new(
        listener,
        TracingLamps::new(),
        config.timing.clone(),
        config.server.address(),
    );

    let (mut handle, transport_task) =
        transport::spawn(config.server.websocket_url(), config.timing.connect_timeout());
    let (control_tx, mut control_rx) = mpsc::channel(8);
    let _signals = tallyd::control::spawn_signal_inputs(control_tx)
        .context("Failed to install control signal handlers")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler failed: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let exit = control_loop
        .run(&mut handle, &mut control_rx, shutdown)
        .await?;

    drop(handle);
    let _ = transport_task.await;

    match exit {
        LoopExit::Shutdown => {
            info!("tallyd shutdown complete");
            Ok(())
        }
        LoopExit::SettingsReset => {
            match tallyconf::reset_user_settings().context("Failed to reset settings")? {
                Some(path) => warn!("Removed {}, restarting", path.display()),
                None => warn!("No user settings to remove, restarting"),
            }
            std::process::exit(RESET_EXIT_CODE);
        }
    }
}
