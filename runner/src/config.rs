use crate::allocator::naming::NamingScheme;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::File,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf, MAIN_SEPARATOR},
};
use thiserror::Error;
use tracing::{error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

/// look up a bare command name in `PATH`
fn find_in_path(command: &str) -> Option<PathBuf> {
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(command))
            .find(|candidate| candidate.is_file())
    })
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config file is invalid")]
    InvalidConfig(#[from] serde_yaml::Error),
    #[error("Executor not supported: {0}")]
    UnsupportedExecutor(String),
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[source] std::io::Error),
    #[error("Preflight checks failed")]
    FailedPreflight,
}

/// Optional settings for a run, read from a YAML file
///
/// Every key has a default, so an empty file and no file at all behave the same.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct RunConfig {
    // file name convention for generated job scripts
    pub naming: NamingScheme,
    // how generated scripts are handed to the scheduler
    pub executor: ExecutorConfig,
    // hold an exclusive lock on the output directory while allocating job files
    pub lock: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            naming: NamingScheme::default(),
            executor: ExecutorConfig::default(),
            lock: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutorConfig {
    // Name of the selected executor, see Executors::load for the selection proccess
    pub name: String,
    // submit command, looked up in PATH unless it contains a separator
    pub exec: String,
    // arguments placed before the job file
    pub params: Vec<String>,
    // kill the submit command after this many milliseconds, wait forever if unset
    pub timeout_ms: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: String::from("slurm"),
            exec: String::from("sbatch"),
            params: Vec::new(),
            timeout_ms: None,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigErrors::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&source)
    }

    pub fn parse(source: &str) -> Result<Self, ConfigErrors> {
        // serde_yaml reads an empty document as unit, not as an empty map
        if source.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(source)?)
    }

    /// Check the configuration and log every problem found.
    ///
    /// Returns true if any error was found. The scheduler is only checked if
    /// `submit` is set.
    pub fn preflight_checks(&self, submit: bool) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.naming.prefix.is_empty() {
            error!("naming.prefix must not be empty");
            contains_error = true;
        } else if self.naming.prefix.contains(MAIN_SEPARATOR) {
            error!(
                "naming.prefix '{}' must not contain a path separator",
                self.naming.prefix
            );
            contains_error = true;
        }

        if self.naming.width == 0 {
            error!("naming.width must be at least 1");
            contains_error = true;
        }

        if self.naming.extension.is_empty() {
            error!("naming.extension must not be empty");
            contains_error = true;
        } else if self.naming.extension.starts_with('.') {
            warn!(
                "naming.extension '{}' starts with a dot, job files will be named like {}",
                self.naming.extension,
                self.naming.file_name(1)
            );
        }

        if self.executor.timeout_ms == Some(0) {
            error!("executor.timeout_ms cannot be 0, leave it unset to wait indefinitely");
            contains_error = true;
        }

        if submit && self.executor.name.eq_ignore_ascii_case("slurm") {
            let exec = &self.executor.exec;

            if exec.contains(MAIN_SEPARATOR) {
                match check_executable(Path::new(exec)) {
                    Ok(true) => {}
                    Ok(false) => {
                        error!("executor.exec {exec} is not executable");
                        contains_error = true;
                    }
                    Err(e) => {
                        error!("Failed to find executor.exec ({exec}): {e}");
                        contains_error = true;
                    }
                }
            } else if find_in_path(exec).is_none() {
                // every submission will fail, but that is reported per file
                warn!("executor.exec '{exec}' was not found in PATH");
            }
        }

        contains_error
    }
}
