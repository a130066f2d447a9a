pub mod lock;
pub mod naming;

use crate::template::RenderedScript;
use lock::{LockError, OutputLock};
use naming::{JobFileName, NamingScheme};
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    ops::RangeInclusive,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, info, trace};

#[derive(Error, Debug)]
pub enum AllocatorError {
    #[error("Failed to create output directory {path:?}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to scan output directory {path:?}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Job file {0:?} does not contain a valid index")]
    MalformedJobFile(PathBuf),
    #[error("Job file {0:?} already exists")]
    JobFileExists(PathBuf),
    #[error("Failed to write job file {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Output directory {0:?} is locked by another run")]
    Locked(PathBuf),
    #[error("Failed to lock output directory {path:?}: {reason}")]
    Lock { path: PathBuf, reason: String },
    #[error("No job file index is left after {0}")]
    IndexExhausted(u64),
}

/// Find the highest job file index in `directory`, 0 if there is none.
///
/// Only regular files are considered. A file that carries the prefix and extension
/// but no valid index is an error instead of being skipped.
pub fn highest_index(directory: &Path, naming: &NamingScheme) -> Result<u64, AllocatorError> {
    let scan_error = |source| AllocatorError::Scan {
        path: directory.to_path_buf(),
        source,
    };
    let mut highest = 0;

    for entry in fs::read_dir(directory).map_err(scan_error)? {
        let path = entry.map_err(scan_error)?.path();

        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            trace!(path = ?path, "Skipped non UTF-8 file name");
            continue;
        };

        match naming.classify(file_name) {
            JobFileName::Index(index) => highest = highest.max(index),
            JobFileName::Unrelated => {}
            JobFileName::Malformed => {
                error!(path = ?path, "Found job file without a valid index");

                return Err(AllocatorError::MalformedJobFile(path));
            }
        }
    }

    Ok(highest)
}

/// Hands out consecutive job file indices for one output directory and persists
/// rendered scripts under them
///
/// The starting index is derived once from the files already present, so repeated
/// runs continue numbering above previous ones.
#[derive(Debug)]
pub struct JobFileAllocator {
    directory: PathBuf,
    naming: NamingScheme,
    next: u64,
    _lock: Option<OutputLock>,
}

impl JobFileAllocator {
    /// create `directory` if needed, optionally lock it and scan for existing job files
    pub fn open(
        directory: &Path,
        naming: NamingScheme,
        lock: bool,
    ) -> Result<Self, AllocatorError> {
        fs::create_dir_all(directory).map_err(|source| AllocatorError::CreateDirectory {
            path: directory.to_path_buf(),
            source,
        })?;

        let lock = if lock {
            Some(
                OutputLock::acquire(directory).map_err(|error| match error {
                    LockError::Held => AllocatorError::Locked(directory.to_path_buf()),
                    LockError::Io(error) => AllocatorError::Lock {
                        path: directory.to_path_buf(),
                        reason: error.to_string(),
                    },
                    LockError::Flock(errno) => AllocatorError::Lock {
                        path: directory.to_path_buf(),
                        reason: errno.desc().to_owned(),
                    },
                })?,
            )
        } else {
            None
        };

        let highest = highest_index(directory, &naming)?;
        let next = highest
            .checked_add(1)
            .ok_or(AllocatorError::IndexExhausted(highest))?;
        debug!(directory = ?directory, next, "Scanned output directory");

        Ok(Self {
            directory: directory.to_path_buf(),
            naming,
            next,
            _lock: lock,
        })
    }

    /// index the next written script will get
    pub fn next_index(&self) -> u64 {
        self.next
    }

    pub fn path_for(&self, index: u64) -> PathBuf {
        self.directory.join(self.naming.file_name(index))
    }

    /// Persist `script` under the next free index. Existing files are never overwritten.
    pub fn write(&mut self, script: &RenderedScript) -> Result<(u64, PathBuf), AllocatorError> {
        let index = self.next;
        let next = index
            .checked_add(1)
            .ok_or(AllocatorError::IndexExhausted(index))?;
        let path = self.path_for(index);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| {
                if source.kind() == ErrorKind::AlreadyExists {
                    AllocatorError::JobFileExists(path.clone())
                } else {
                    AllocatorError::Write {
                        path: path.clone(),
                        source,
                    }
                }
            })?;

        file.write_all(script.contents().as_bytes())
            .map_err(|source| AllocatorError::Write {
                path: path.clone(),
                source,
            })?;

        trace!(index, path = ?path, "Wrote job file");
        self.next = next;

        Ok((index, path))
    }

    /// Write all scripts in order and return the inclusive range of used indices.
    /// The range is empty if there were no scripts.
    pub fn write_all<I>(&mut self, scripts: I) -> Result<RangeInclusive<u64>, AllocatorError>
    where
        I: IntoIterator<Item = RenderedScript>,
    {
        let start = self.next;

        for script in scripts {
            self.write(&script)?;
        }

        let end = self.next - 1;
        info!(
            "Wrote {} job files to {}",
            self.next - start,
            self.directory.display()
        );

        Ok(start..=end)
    }
}
