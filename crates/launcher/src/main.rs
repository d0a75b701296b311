//! Spectral Launcher
//!
//! Spawns a target application on behalf of the driver, applying the
//! `--spectron-*` arguments first, and exits with the target's exit code.
//! Stdout belongs to the target, so diagnostics go to stderr.

use anyhow::Context;
use std::process::{Command, Stdio};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod plan;

use plan::LaunchPlan;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run() -> anyhow::Result<i32> {
    let plan = LaunchPlan::parse(std::env::args_os().skip(1))?;

    plan.prepare_files().context("failed to create requested files")?;

    debug!(
        executable = %plan.executable.display(),
        args = ?plan.args,
        "Launching target"
    );

    let status = Command::new(&plan.executable)
        .args(&plan.args)
        .envs(plan.env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(stdout_as_stdio().context("failed to share stdout")?)
        .status()
        .with_context(|| format!("failed to launch {}", plan.executable.display()))?;

    debug!(%status, "Target exited");

    // Killed by a signal
    Ok(status.code().unwrap_or(1))
}

/// The target's stderr is merged into our stdout
#[cfg(unix)]
fn stdout_as_stdio() -> std::io::Result<Stdio> {
    use std::os::fd::AsFd;
    Ok(Stdio::from(std::io::stdout().as_fd().try_clone_to_owned()?))
}

#[cfg(windows)]
fn stdout_as_stdio() -> std::io::Result<Stdio> {
    use std::os::windows::io::AsHandle;
    Ok(Stdio::from(std::io::stdout().as_handle().try_clone_to_owned()?))
}
