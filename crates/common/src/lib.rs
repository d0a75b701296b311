//! Spectral Common Library
//!
//! Shared configuration, error types and child-environment construction for
//! supervising a WebDriver-compatible driver process.

pub mod config;
pub mod environment;
pub mod error;

// Re-export commonly used types
pub use config::DriverConfig;
pub use environment::{EnvironmentBuilder, HostPlatform};
pub use error::{Error, Result};

/// Spectral version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the launcher binary shipped alongside the supervisor
pub const LAUNCHER_BIN: &str = "spectral-launcher";

/// Default location of the launcher: next to the running executable
pub fn default_launcher_path() -> std::path::PathBuf {
    let name = format!("{}{}", LAUNCHER_BIN, std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .unwrap_or_else(|| std::path::PathBuf::from(name))
}

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".spectral")
        .join("driver.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(std::path::PathBuf::from)
    }
}
