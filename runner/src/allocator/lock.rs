use nix::{
    errno::Errno,
    fcntl::{flock, FlockArg},
};
use std::{
    fs::{File, OpenOptions},
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
};
use tracing::debug;

/// name of the lock file inside the output directory, never matches a job file name
pub const LOCK_FILE: &str = ".onejob.lock";

#[derive(Debug)]
pub enum LockError {
    /// another process holds the lock
    Held,
    Io(std::io::Error),
    Flock(Errno),
}

/// Exclusive advisory lock on an output directory
///
/// The `flock` is tied to the open file, so it is released when this is dropped
/// or when the process dies.
#[derive(Debug)]
pub struct OutputLock {
    file: File,
    path: PathBuf,
}

impl OutputLock {
    /// acquire the lock without blocking
    pub fn acquire(directory: &Path) -> Result<Self, LockError> {
        let path = directory.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(LockError::Io)?;

        match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => {
                debug!(path = ?path, "Acquired output directory lock");

                Ok(Self { file, path })
            }
            Err(errno) if errno == Errno::EWOULDBLOCK => Err(LockError::Held),
            Err(errno) => Err(LockError::Flock(errno)),
        }
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        match flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            Ok(()) => debug!(path = ?self.path, "Released output directory lock"),
            Err(errno) => debug!(path = ?self.path, errno = ?errno, "Lock is released on close"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_is_refused() {
        let dir = tempfile::tempdir().unwrap();

        let lock = OutputLock::acquire(dir.path()).unwrap();
        assert!(dir.path().join(LOCK_FILE).is_file());
        assert!(matches!(
            OutputLock::acquire(dir.path()),
            Err(LockError::Held)
        ));

        drop(lock);
        assert!(OutputLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            OutputLock::acquire(&dir.path().join("missing")),
            Err(LockError::Io(_))
        ));
    }
}
