//! Child process environment construction
//!
//! The driver inherits the complete parent environment. On Windows the
//! driver cannot exec the target application directly, so two extra
//! variables tell it where to find an interpreter and the launcher.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Variable holding the path of the running executable
pub const NODE_PATH_VAR: &str = "SPECTRON_NODE_PATH";

/// Variable holding the absolute path of the launcher
pub const LAUNCHER_PATH_VAR: &str = "SPECTRON_LAUNCHER_PATH";

/// Host platform, as far as the driver environment is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Windows,
    Other,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else {
            HostPlatform::Other
        }
    }
}

/// Builds the environment mapping handed to the driver process
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    parent: BTreeMap<OsString, OsString>,
    platform: HostPlatform,
    runtime_path: PathBuf,
    launcher_path: PathBuf,
}

impl EnvironmentBuilder {
    pub fn new(
        parent: impl IntoIterator<Item = (OsString, OsString)>,
        platform: HostPlatform,
        runtime_path: impl Into<PathBuf>,
        launcher_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            parent: parent.into_iter().collect(),
            platform,
            runtime_path: runtime_path.into(),
            launcher_path: launcher_path.into(),
        }
    }

    /// Snapshot of this process's environment and platform
    pub fn from_current_process(launcher_path: impl Into<PathBuf>) -> Self {
        let runtime_path = std::env::current_exe().unwrap_or_default();
        Self::new(
            std::env::vars_os(),
            HostPlatform::current(),
            runtime_path,
            launcher_path,
        )
    }

    pub fn build(&self) -> BTreeMap<OsString, OsString> {
        let mut env = self.parent.clone();

        if self.platform == HostPlatform::Windows {
            let launcher = absolute(&self.launcher_path);
            debug!(
                runtime = %self.runtime_path.display(),
                launcher = %launcher.display(),
                "Injecting launcher variables"
            );
            env.insert(
                OsString::from(NODE_PATH_VAR),
                self.runtime_path.clone().into_os_string(),
            );
            env.insert(OsString::from(LAUNCHER_PATH_VAR), launcher.into_os_string());
        }

        env
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> Vec<(OsString, OsString)> {
        vec![
            (OsString::from("PATH"), OsString::from("/usr/bin:/bin")),
            (OsString::from("HOME"), OsString::from("/home/tester")),
            (OsString::from("EMPTY"), OsString::from("")),
        ]
    }

    #[test]
    fn test_inherits_everything_off_windows() {
        let builder = EnvironmentBuilder::new(
            parent(),
            HostPlatform::Other,
            "/usr/bin/spectral",
            "/usr/bin/spectral-launcher",
        );
        let env = builder.build();

        assert_eq!(env.len(), 3);
        for (key, value) in parent() {
            assert_eq!(env.get(&key), Some(&value));
        }
        assert!(!env.contains_key(&OsString::from(NODE_PATH_VAR)));
    }

    #[test]
    fn test_windows_adds_two_variables() {
        let builder = EnvironmentBuilder::new(
            parent(),
            HostPlatform::Windows,
            "/usr/bin/spectral",
            "launcher/spectral-launcher",
        );
        let env = builder.build();

        assert_eq!(env.len(), 5);
        for (key, value) in parent() {
            assert_eq!(env.get(&key), Some(&value));
        }
        assert_eq!(
            env.get(&OsString::from(NODE_PATH_VAR)),
            Some(&OsString::from("/usr/bin/spectral"))
        );
        let launcher = PathBuf::from(&env[&OsString::from(LAUNCHER_PATH_VAR)]);
        assert!(launcher.is_absolute());
        assert!(launcher.ends_with("launcher/spectral-launcher"));
    }

    #[test]
    fn test_current_process_environment_is_copied() {
        let env = EnvironmentBuilder::from_current_process("spectral-launcher").build();
        for (key, value) in std::env::vars_os() {
            assert_eq!(env.get(&key), Some(&value));
        }
    }
}
