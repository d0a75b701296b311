//! Spectral Driver Supervisor
//!
//! Runs a WebDriver-compatible driver as a child process and tells the
//! caller when it is ready to accept commands:
//! - Spawns the driver with the inherited environment
//! - Captures its stdout into an in-memory log, optionally persisting raw lines
//! - Polls the driver's `/status` endpoint until ready, timed out or stopped
//! - Registers a shutdown hook so the driver never outlives its host
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──start()──▶ Starting ──ready──▶ Running
//!    ▲                   │                   │
//!    └──── stop() ◀──────┴── timeout/stop ───┘
//! ```

pub mod capture;
pub mod health;
pub mod hooks;
pub mod supervisor;

pub use capture::{LogBuffer, LogCapture, BANNER_LINES};
pub use health::{HealthPoller, HttpStatusProbe, StatusProbe, POLL_INTERVAL};
pub use hooks::{HookId, ShutdownGuard, ShutdownRegistry};
pub use supervisor::{DriverSupervisor, Readiness, SupervisorState};

pub use spectral_common::{DriverConfig, Error, Result};
