use super::{DispatchError, Submission};
use crate::config::ExecutorConfig;
use std::{
    ffi::OsString,
    io::Read,
    path::Path,
    process::{Command, Stdio},
    time::{Duration, Instant},
};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Submits job files by running the scheduler's submit command, `sbatch` by default
#[derive(Debug, Clone)]
pub struct SlurmExecutor {
    pub exec: OsString,
    pub params: Vec<OsString>,
    pub timeout: Option<Duration>,
}

fn read_pipe<R: Read>(pipe: Option<R>) -> std::io::Result<String> {
    let mut buffer = String::new();

    if let Some(mut pipe) = pipe {
        pipe.read_to_string(&mut buffer)?;
    }

    Ok(buffer)
}

impl SlurmExecutor {
    pub fn load(config: &ExecutorConfig) -> Self {
        Self {
            exec: OsString::from(&config.exec),
            params: config.params.iter().map(OsString::from).collect(),
            timeout: config.timeout_ms.map(Duration::from_millis),
        }
    }

    /// Run `<exec> <params...> <path>` and wait for it to finish.
    ///
    /// A non-zero exit status is reported as an error together with the captured stderr.
    pub fn submit(&self, path: &Path) -> Result<Submission, DispatchError> {
        let start = Instant::now();
        let mut child = Command::new(&self.exec)
            .args(self.params.iter())
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(DispatchError::Spawn)?;

        debug!("Scheduler waiting on {}", child.id());

        let (status, stdout, stderr) = match self.timeout {
            None => {
                let output = child.wait_with_output().map_err(DispatchError::Wait)?;

                (
                    output.status,
                    String::from_utf8_lossy(&output.stdout).into_owned(),
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                )
            }
            Some(timeout) => match child.wait_timeout(timeout).map_err(DispatchError::Wait)? {
                Some(status) => (
                    status,
                    read_pipe(child.stdout.take()).map_err(DispatchError::Wait)?,
                    read_pipe(child.stderr.take()).map_err(DispatchError::Wait)?,
                ),
                None => {
                    // child hasn't exited yet
                    if let Err(error) = child.kill().and_then(|_| child.wait()) {
                        warn!(error = ?error, "Failed to kill scheduler after timeout");
                    }

                    return Err(DispatchError::Timeout(timeout));
                }
            },
        };

        let runtime = start.elapsed();
        debug!(
            "Finished in {} ms | status: {}",
            runtime.as_millis(),
            status.success()
        );

        if status.success() {
            Ok(Submission {
                output: stdout.trim().to_owned(),
                runtime,
            })
        } else {
            Err(DispatchError::ExitStatus {
                code: status.code(),
                stderr: stderr.trim().to_owned(),
            })
        }
    }
}
