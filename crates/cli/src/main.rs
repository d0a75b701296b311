//! Spectral CLI - Main Entry Point
//!
//! Starts a driver under supervision, waits for it to become ready and keeps
//! it running until Ctrl-C. Owns the shutdown registry, so the driver is
//! killed on every exit path.

use anyhow::Context;
use clap::Parser;
use spectral_common::{default_config_path, DriverConfig, VERSION};
use spectral_supervisor::{DriverSupervisor, ShutdownRegistry};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Spectral - supervised WebDriver driver process
#[derive(Parser, Debug)]
#[command(name = "spectral")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ~/.spectral/driver.toml)
    #[arg(short, long, env = "SPECTRAL_CONFIG")]
    config: Option<PathBuf>,

    /// Host the status endpoint is polled on
    #[arg(long, env = "SPECTRAL_HOST")]
    host: Option<String>,

    /// Driver port
    #[arg(short, long, env = "SPECTRAL_PORT")]
    port: Option<u16>,

    /// Interpreter that runs the driver script
    #[arg(long)]
    interpreter: Option<PathBuf>,

    /// Driver script
    #[arg(long)]
    driver_script: Option<PathBuf>,

    /// Readiness budget in milliseconds
    #[arg(long)]
    start_timeout_ms: Option<u64>,

    /// Working directory of the driver
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Driver log file (enables verbose driver logging)
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    save_config: bool,

    /// Print the captured driver output on shutdown
    #[arg(long)]
    print_logs: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn apply(&self, config: &mut DriverConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(interpreter) = &self.interpreter {
            config.interpreter = interpreter.clone();
        }
        if let Some(script) = &self.driver_script {
            config.driver_script = script.clone();
        }
        if let Some(timeout) = self.start_timeout_ms {
            config.start_timeout_ms = timeout;
        }
        if let Some(dir) = &self.working_dir {
            config.working_directory = dir.clone();
        }
        if let Some(path) = &self.log_path {
            config.log_path = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("Spectral v{}", VERSION);

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = DriverConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    cli.apply(&mut config);
    config.validate()?;

    if cli.save_config {
        config.save(&config_path)?;
        info!("Configuration written to {}", config_path.display());
        return Ok(());
    }

    let hooks = ShutdownRegistry::new();
    let _guard = hooks.guard();
    let supervisor = DriverSupervisor::new(config, Some(hooks.clone()))?;

    let readiness = supervisor.start()?;
    tokio::select! {
        result = readiness => {
            if let Err(e) = result {
                if e.is_readiness_failure() {
                    error!(error = %e, "Driver failed to become ready");
                    for line in supervisor.get_logs() {
                        eprintln!("{}", line);
                    }
                }
                return Err(e.into());
            }
            info!("Driver ready at {}", supervisor.config().status_url());
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted before the driver became ready");
            hooks.run_all();
            return Ok(());
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    if cli.print_logs {
        for line in supervisor.get_logs() {
            println!("{}", line);
        }
    }

    let stopped = hooks.run_all();
    info!(hooks = stopped, "Shutdown complete");
    Ok(())
}
