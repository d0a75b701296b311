//! Driver configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Suffix inserted before the extension of the raw capture file
pub const RAW_CAPTURE_SUFFIX: &str = "-raw";

/// URL base the driver serves from
pub const URL_BASE: &str = "/";

/// Immutable driver configuration, supplied once per supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Host the status endpoint is polled on
    pub host: String,

    /// Port passed to the driver and polled for readiness
    pub port: u16,

    /// Interpreter used to run the driver script
    pub interpreter: PathBuf,

    /// Driver script, first argument to the interpreter
    pub driver_script: PathBuf,

    /// Readiness budget in milliseconds
    pub start_timeout_ms: u64,

    /// Working directory of the driver process
    pub working_directory: PathBuf,

    /// Driver log file; enables verbose logging and raw line capture
    pub log_path: Option<PathBuf>,

    /// Launcher binary advertised to the driver on Windows
    pub launcher_path: Option<PathBuf>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9515,
            interpreter: PathBuf::from("node"),
            driver_script: PathBuf::from("chromedriver"),
            start_timeout_ms: 5000,
            working_directory: PathBuf::from("."),
            log_path: None,
            launcher_path: None,
        }
    }
}

impl DriverConfig {
    /// Create a configuration for a driver script run by `interpreter`
    pub fn new(
        host: impl Into<String>,
        port: u16,
        interpreter: impl Into<PathBuf>,
        driver_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            interpreter: interpreter.into(),
            driver_script: driver_script.into(),
            ..Default::default()
        }
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_launcher_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.launcher_path = Some(path.into());
        self
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations that cannot produce a working launch
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must be non-zero".to_string()));
        }
        if self.interpreter.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "interpreter path must not be empty".to_string(),
            ));
        }
        if self.driver_script.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "driver script path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    /// Readiness endpoint of the driver
    pub fn status_url(&self) -> String {
        format!("http://{}:{}{}status", self.host, self.port, URL_BASE)
    }

    /// Arguments passed to the interpreter
    pub fn launch_args(&self) -> Vec<OsString> {
        let mut args = vec![
            self.driver_script.clone().into_os_string(),
            OsString::from(format!("--port={}", self.port)),
            OsString::from(format!("--url-base={}", URL_BASE)),
        ];

        if let Some(log_path) = &self.log_path {
            args.push(OsString::from("--verbose"));
            let mut arg = OsString::from("--log-path=");
            arg.push(log_path);
            args.push(arg);
        }

        args
    }

    /// File that receives every raw stdout line when a log path is set
    pub fn raw_capture_path(&self) -> Option<PathBuf> {
        self.log_path.as_deref().map(raw_capture_path_for)
    }

    /// Launcher location, falling back to the one beside this executable
    pub fn launcher_path(&self) -> PathBuf {
        self.launcher_path
            .clone()
            .unwrap_or_else(crate::default_launcher_path)
    }
}

/// `<dir>/<name>.<ext>` becomes `<dir>/<name up to first dot>-raw.<ext>`
pub fn raw_capture_path_for(log_path: &Path) -> PathBuf {
    let file_name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default();

    let mut name = format!("{}{}", stem, RAW_CAPTURE_SUFFIX);
    if let Some(ext) = log_path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }

    match log_path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
