//! Launcher argument parsing
//!
//! `--spectron-*` arguments configure the launch and are consumed here;
//! everything else is forwarded to the target untouched.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

const PREFIX: &str = "--spectron-";
const PATH_ARG: &str = "--spectron-path";
const ARG_PREFIX: &str = "--spectron-arg";
const ENV_PREFIX: &str = "--spectron-env";
const CREATE_FILE_PREFIX: &str = "--spectron-create-file";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("missing {}=<executable>", PATH_ARG)]
    MissingExecutable,
}

/// What to spawn, with what, after which preparation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub executable: PathBuf,
    /// Positional application arguments followed by forwarded arguments
    pub args: Vec<OsString>,
    pub env: Vec<(String, OsString)>,
    pub create_files: Vec<PathBuf>,
}

impl LaunchPlan {
    pub fn parse<I, S>(args: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut executable = None;
        let mut app_args = BTreeMap::new();
        let mut forwarded = Vec::new();
        let mut env = Vec::new();
        let mut create_files = Vec::new();

        for arg in args {
            let arg = arg.into();
            let Some((name, value)) = split_arg(&arg) else {
                forwarded.push(arg);
                continue;
            };

            if name == PATH_ARG {
                executable = Some(PathBuf::from(value));
            } else if let Some(index) = name.strip_prefix(ARG_PREFIX) {
                match parse_index(index) {
                    Some(index) => {
                        app_args.insert(index, value.to_os_string());
                    }
                    None => warn!(argument = %name, "Ignoring argument with invalid index"),
                }
            } else if let Some(rest) = name.strip_prefix(ENV_PREFIX) {
                // One separator character sits between the prefix and the name
                let key: String = rest.chars().skip(1).collect();
                if key.is_empty() {
                    warn!(argument = %name, "Ignoring environment argument without a name");
                } else {
                    env.push((key, value.to_os_string()));
                }
            } else if name.starts_with(CREATE_FILE_PREFIX) {
                create_files.push(PathBuf::from(value));
            } else if name.starts_with(PREFIX) {
                debug!(argument = %name, "Dropping unknown launcher argument");
            } else {
                forwarded.push(arg);
            }
        }

        let executable = executable.ok_or(PlanError::MissingExecutable)?;
        let mut args: Vec<OsString> = app_args.into_values().collect();
        args.extend(forwarded);

        Ok(Self {
            executable,
            args,
            env,
            create_files,
        })
    }

    /// Make sure every requested file exists, leaving contents alone
    pub fn prepare_files(&self) -> std::io::Result<()> {
        for path in &self.create_files {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            OpenOptions::new().create(true).append(true).open(path)?;
        }
        Ok(())
    }
}

/// `name=value` with a UTF-8 name; the value keeps its raw encoding
fn split_arg(arg: &OsStr) -> Option<(&str, &OsStr)> {
    let bytes = arg.as_encoded_bytes();
    let eq = bytes.iter().position(|b| *b == b'=')?;
    let name = std::str::from_utf8(&bytes[..eq]).ok()?;
    // SAFETY: split right after an ASCII `=`, a valid boundary in the OS encoding
    let value = unsafe { OsStr::from_encoded_bytes_unchecked(&bytes[eq + 1..]) };
    Some((name, value))
}

/// Empty means position zero
fn parse_index(raw: &str) -> Option<usize> {
    if raw.is_empty() {
        Some(0)
    } else {
        raw.parse().ok()
    }
}
