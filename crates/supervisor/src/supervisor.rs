//! Driver process supervision
//!
//! [`DriverSupervisor`] owns at most one driver process at a time. `start`
//! spawns it and hands back a [`Readiness`] future; `stop` tears it down and
//! never fails. The process handle is the only state shared with the
//! readiness future, and both sides touch it under a single lock.

use crate::capture::{LogBuffer, LogCapture};
use crate::health::{HealthPoller, HttpStatusProbe, StatusProbe};
use crate::hooks::{HookId, ShutdownRegistry};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use spectral_common::{DriverConfig, EnvironmentBuilder, Error, Result};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Resolves once the driver reports ready, or with why it never will
pub type Readiness = BoxFuture<'static, Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No driver process
    Idle,
    /// Spawned, readiness pending
    Starting,
    /// Readiness confirmed
    Running,
}

/// One live driver process
struct ActiveRun {
    id: u64,
    child: Child,
    pid: Option<u32>,
    stopped: CancellationToken,
    hook: Option<HookId>,
    ready: bool,
}

struct Shared {
    config: DriverConfig,
    probe: Arc<dyn StatusProbe>,
    hooks: Option<ShutdownRegistry>,
    run: Mutex<Option<ActiveRun>>,
    logs: Mutex<LogBuffer>,
    next_run: AtomicU64,
}

/// Supervises a WebDriver-compatible driver process
pub struct DriverSupervisor {
    shared: Arc<Shared>,
}

impl DriverSupervisor {
    /// Create a supervisor that polls the driver over HTTP
    pub fn new(config: DriverConfig, hooks: Option<ShutdownRegistry>) -> Result<Self> {
        let probe = HttpStatusProbe::new(config.status_url())?;
        Ok(Self::with_probe(config, hooks, Arc::new(probe)))
    }

    /// Create a supervisor with a custom readiness probe
    pub fn with_probe(
        config: DriverConfig,
        hooks: Option<ShutdownRegistry>,
        probe: Arc<dyn StatusProbe>,
    ) -> Self {
        info!(
            host = %config.host,
            port = config.port,
            status_url = %config.status_url(),
            "Created driver supervisor"
        );

        Self {
            shared: Arc::new(Shared {
                config,
                probe,
                hooks,
                run: Mutex::new(None),
                logs: Mutex::new(LogBuffer::new()),
                next_run: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.shared.config
    }

    /// Spawn the driver and return a future that resolves when it is ready.
    ///
    /// Fails without spawning if a driver is already running. The returned
    /// future fails with [`Error::StartTimeout`] (after tearing the driver
    /// down) or [`Error::StoppedDuringStart`] if `stop` runs first.
    pub fn start(&self) -> Result<Readiness> {
        let shared = &self.shared;
        let config = &shared.config;

        let mut slot = shared.run.lock();
        if slot.is_some() {
            return Err(Error::AlreadyStarted);
        }
        config.validate()?;

        info!(port = config.port, "Starting driver");

        let env = EnvironmentBuilder::from_current_process(config.launcher_path()).build();
        let mut child = Command::new(&config.interpreter)
            .args(config.launch_args())
            .env_clear()
            .envs(env)
            .current_dir(&config.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", config.interpreter.display(), e)))?;

        let pid = child.id();
        let run_id = shared.next_run.fetch_add(1, Ordering::Relaxed);
        debug!(?pid, run_id, "Driver spawned");

        // Each run captures into its own buffer
        let buffer = LogBuffer::new();
        *shared.logs.lock() = buffer.clone();
        if let Some(stdout) = child.stdout.take() {
            LogCapture::new(buffer, config.raw_capture_path()).spawn(stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr, config.port);
        }

        let hook = shared.hooks.as_ref().map(|registry| {
            let weak = Arc::downgrade(shared);
            let port = config.port;
            registry.register(move || {
                if let Some(shared) = weak.upgrade() {
                    info!(port, "Stopping driver on host exit");
                    shared.stop_run(Some(run_id));
                }
            })
        });

        let stopped = CancellationToken::new();
        *slot = Some(ActiveRun {
            id: run_id,
            child,
            pid,
            stopped: stopped.clone(),
            hook,
            ready: false,
        });
        drop(slot);

        let poller = HealthPoller::new(shared.probe.clone(), config.start_timeout());
        let shared = Arc::clone(shared);

        Ok(Box::pin(async move {
            let result = poller.wait_until_ready(&stopped).await;
            match &result {
                Ok(()) => {
                    if !shared.mark_ready(run_id) {
                        warn!(port = shared.config.port, "Driver stopped as it became ready");
                        return Err(Error::StoppedDuringStart);
                    }
                }
                Err(e @ Error::StartTimeout { .. }) => {
                    error!(port = shared.config.port, "{}", e);
                    shared.stop_run(Some(run_id));
                }
                Err(_) => {}
            }
            result
        }))
    }

    /// Kill the driver if one is running and reset all run state
    pub fn stop(&self) {
        self.shared.stop_run(None);
    }

    /// Copy of the retained driver output
    pub fn get_logs(&self) -> Vec<String> {
        self.shared.logs.lock().snapshot()
    }

    pub fn clear_logs(&self) {
        self.shared.logs.lock().clear();
    }

    pub fn state(&self) -> SupervisorState {
        match self.shared.run.lock().as_ref() {
            None => SupervisorState::Idle,
            Some(run) if run.ready => SupervisorState::Running,
            Some(_) => SupervisorState::Starting,
        }
    }

    /// OS process id of the running driver
    pub fn pid(&self) -> Option<u32> {
        self.shared.run.lock().as_ref().and_then(|run| run.pid)
    }
}

impl Drop for DriverSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    /// Returns false when the run was torn down before readiness landed
    fn mark_ready(&self, run_id: u64) -> bool {
        match self.run.lock().as_mut() {
            Some(run) if run.id == run_id && !run.stopped.is_cancelled() => {
                run.ready = true;
                true
            }
            _ => false,
        }
    }

    /// Tear down the current run; with `only`, just when it is that run
    fn stop_run(&self, only: Option<u64>) {
        let run = {
            let mut slot = self.run.lock();
            if let (Some(id), Some(active)) = (only, slot.as_ref()) {
                if active.id != id {
                    return;
                }
            }
            let run = slot.take();
            // Cancel before the lock drops so readiness never outruns a stop
            if let Some(run) = &run {
                run.stopped.cancel();
            }
            run
        };

        if let Some(mut run) = run {
            info!(port = self.config.port, pid = ?run.pid, "Stopping driver");

            if let (Some(registry), Some(hook)) = (&self.hooks, run.hook.take()) {
                registry.deregister(hook);
            }

            if let Err(e) = run.child.start_kill() {
                warn!(pid = ?run.pid, error = %e, "Failed to kill driver process");
            }
            reap(run.child);
        }

        let previous = std::mem::take(&mut *self.logs.lock());
        previous.clear();
    }
}

fn reap(mut child: Child) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                match child.wait().await {
                    Ok(status) => debug!(%status, "Driver exited"),
                    Err(e) => warn!(error = %e, "Failed to reap driver process"),
                }
            });
        }
        // No runtime left; kill_on_drop and the orphan reaper take over
        Err(_) => drop(child),
    }
}

fn forward_stderr(stderr: ChildStderr, port: u16) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(port, "driver stderr: {}", line);
        }
    });
}
