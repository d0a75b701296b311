//! Error types for Spectral

use thiserror::Error;

/// Result type alias using Spectral Error
pub type Result<T> = std::result::Result<T, Error>;

/// Spectral error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Driver already started")]
    AlreadyStarted,

    #[error("Driver has been stopped")]
    StoppedDuringStart,

    #[error("Driver did not start within {timeout_ms}ms")]
    StartTimeout { timeout_ms: u64 },

    #[error("Failed to spawn driver: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),
}

impl Error {
    /// Whether this error came out of the readiness wait rather than setup
    pub fn is_readiness_failure(&self) -> bool {
        matches!(self, Error::StoppedDuringStart | Error::StartTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_includes_budget() {
        let err = Error::StartTimeout { timeout_ms: 2500 };
        assert_eq!(err.to_string(), "Driver did not start within 2500ms");
        assert!(err.is_readiness_failure());
    }

    #[test]
    fn test_already_started_is_not_readiness_failure() {
        assert!(!Error::AlreadyStarted.is_readiness_failure());
        assert!(Error::StoppedDuringStart.is_readiness_failure());
    }
}
