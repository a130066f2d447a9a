mod slurm;

pub use slurm::SlurmExecutor;

use crate::{
    allocator::naming::NamingScheme,
    config::{ConfigErrors, ExecutorConfig},
};
use std::{
    ops::RangeInclusive,
    path::Path,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to spawn scheduler")]
    Spawn(#[source] std::io::Error),
    #[error("Failed to wait for the scheduler process")]
    Wait(#[source] std::io::Error),
    #[error(
        "Scheduler exited with status {}: {stderr}",
        .code.map_or(String::from("<signal>"), |code| code.to_string())
    )]
    ExitStatus { code: Option<i32>, stderr: String },
    #[error("Scheduler did not finish within {0:?}")]
    Timeout(Duration),
}

/// A successful hand over of one job file to the scheduler
#[derive(Debug, Clone)]
pub struct Submission {
    /// trimmed stdout of the submit command, e.g. `Submitted batch job 42`
    pub output: String,
    pub runtime: Duration,
}

/// Per file outcome of a dispatch run, keyed by job file index
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub submitted: Vec<(u64, Submission)>,
    pub failed: Vec<(u64, DispatchError)>,
    pub skipped: Vec<u64>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.submitted.len() + self.failed.len() + self.skipped.len()
    }
}

#[derive(Clone, Debug)]
pub enum Executors {
    Slurm(SlurmExecutor),
    /// only logs what would be submitted
    Null,
}

impl Executors {
    pub fn load(config: &ExecutorConfig) -> Result<Self, ConfigErrors> {
        match config.name.to_lowercase().as_str() {
            "slurm" => Ok(Self::Slurm(SlurmExecutor::load(config))),
            "null" => Ok(Self::Null),
            _ => Err(ConfigErrors::UnsupportedExecutor(config.name.clone())),
        }
    }

    /// Submit every job file in `range`, in ascending order.
    ///
    /// Each file is handled on its own: a failed submission is recorded and the
    /// remaining files are still submitted.
    #[instrument(skip(self, naming), level = "info")]
    pub fn dispatch(
        &self,
        directory: &Path,
        naming: &NamingScheme,
        range: RangeInclusive<u64>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let total = range.clone().count();

        for index in range {
            let path = directory.join(naming.file_name(index));

            match self {
                Self::Slurm(executor) => match executor.submit(&path) {
                    Ok(submission) => {
                        info!(
                            index,
                            path = ?path,
                            runtime_ms = submission.runtime.as_millis() as u64,
                            "{}",
                            submission.output
                        );
                        report.submitted.push((index, submission));
                    }
                    Err(error) => {
                        debug!(index, path = ?path, "Submission of {} failed", path.display());
                        report.failed.push((index, error));
                    }
                },
                Self::Null => {
                    info!(index, path = ?path, "Would submit {}", path.display());
                    report.skipped.push(index);
                }
            }
        }

        info!(
            "Done with {}/{total} job files ({} submitted, {} failed, {} skipped)",
            report.total(),
            report.submitted.len(),
            report.failed.len(),
            report.skipped.len()
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn shell(script: &str) -> ExecutorConfig {
        ExecutorConfig {
            name: String::from("slurm"),
            exec: String::from("sh"),
            params: vec![String::from("-c"), script.to_owned(), String::from("sh")],
            timeout_ms: None,
        }
    }

    fn write_jobs(dir: &Path, count: u64) {
        let naming = NamingScheme::default();

        for index in 1..=count {
            fs::write(dir.join(naming.file_name(index)), "#!/bin/bash\n").unwrap();
        }
    }

    #[test]
    fn load_by_name() {
        assert!(matches!(
            Executors::load(&shell("true")).unwrap(),
            Executors::Slurm(_)
        ));
        assert!(matches!(
            Executors::load(&ExecutorConfig {
                name: "NULL".into(),
                ..ExecutorConfig::default()
            })
            .unwrap(),
            Executors::Null
        ));
        assert!(matches!(
            Executors::load(&ExecutorConfig {
                name: "pbs".into(),
                ..ExecutorConfig::default()
            }),
            Err(ConfigErrors::UnsupportedExecutor(name)) if name == "pbs"
        ));
    }

    #[test]
    fn submit_passes_file_as_last_argument() {
        let dir = tempfile::tempdir().unwrap();
        write_jobs(dir.path(), 1);
        let path = dir.path().join("temp_00001.sbatch");

        let submission = SlurmExecutor::load(&shell("echo \"Submitted batch job 42 for $1\""))
            .submit(&path)
            .unwrap();

        assert_eq!(
            submission.output,
            format!("Submitted batch job 42 for {}", path.display())
        );
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let error = SlurmExecutor::load(&shell(
            "echo 'sbatch: error: invalid partition' >&2; exit 3",
        ))
        .submit(Path::new("temp_00001.sbatch"))
        .unwrap_err();

        match error {
            DispatchError::ExitStatus { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "sbatch: error: invalid partition");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_scheduler_is_a_spawn_error() {
        let executor = SlurmExecutor::load(&ExecutorConfig {
            exec: String::from("/nonexistent/onejob/sbatch"),
            ..ExecutorConfig::default()
        });

        assert!(matches!(
            executor.submit(Path::new("temp_00001.sbatch")),
            Err(DispatchError::Spawn(_))
        ));
    }

    #[test]
    fn hung_scheduler_times_out() {
        let executor = SlurmExecutor::load(&ExecutorConfig {
            timeout_ms: Some(100),
            ..shell("sleep 5")
        });

        assert!(matches!(
            executor.submit(Path::new("temp_00001.sbatch")),
            Err(DispatchError::Timeout(timeout)) if timeout == Duration::from_millis(100)
        ));
    }

    #[test]
    fn failures_do_not_stop_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        write_jobs(dir.path(), 4);

        let executor = Executors::load(&shell(
            "case \"$1\" in *00002*|*00003*) exit 1;; esac; echo ok",
        ))
        .unwrap();
        let report = executor.dispatch(dir.path(), &NamingScheme::default(), 1..=4);

        assert!(!report.is_success());
        assert_eq!(report.total(), 4);
        assert_eq!(
            report.submitted.iter().map(|(index, _)| *index).collect::<Vec<_>>(),
            vec![1, 4]
        );
        assert_eq!(
            report.failed.iter().map(|(index, _)| *index).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn dispatch_in_ascending_order() {
        let dir = tempfile::tempdir().unwrap();
        write_jobs(dir.path(), 3);
        let log = dir.path().join("submitted.log");

        let executor = Executors::load(&shell(&format!(
            "basename \"$1\" >> '{}'",
            log.display()
        )))
        .unwrap();
        let report = executor.dispatch(dir.path(), &NamingScheme::default(), 2..=3);

        assert!(report.is_success());
        assert_eq!(
            fs::read_to_string(log).unwrap(),
            "temp_00002.sbatch\ntemp_00003.sbatch\n"
        );
    }

    #[test]
    fn null_executor_skips_everything() {
        let report = Executors::Null.dispatch(Path::new("jobs"), &NamingScheme::default(), 5..=7);

        assert!(report.is_success());
        assert_eq!(report.skipped, vec![5, 6, 7]);
        assert!(report.submitted.is_empty());
    }

    #[test]
    fn empty_range_dispatches_nothing() {
        #[allow(clippy::reversed_empty_ranges)]
        let report = Executors::Null.dispatch(Path::new("jobs"), &NamingScheme::default(), 3..=2);

        assert_eq!(report.total(), 0);
    }
}
