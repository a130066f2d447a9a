//! onejob: generate a batch of job scripts from one template and a table of
//! parameter combinations, then optionally submit each of them to the scheduler.
//!
//! A template marks parameters as `$$NAME$$`. Every row of the CSV table becomes
//! one script, named `temp_<index>.sbatch` by default, where the index continues
//! above the highest one already present in the output directory.

mod allocator;
mod config;
mod executors;
mod params;
mod template;

use allocator::{AllocatorError, JobFileAllocator};
use clap::Parser;
use config::{ConfigErrors, RunConfig};
use executors::{DispatchReport, Executors};
use params::{validate, ParameterError, ParameterMismatchError, ParameterTable};
use std::{
    error::Error as _,
    io::IsTerminal,
    ops::RangeInclusive,
    path::PathBuf,
    process::exit,
};
use template::{Template, TemplateError};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "onejob",
    version,
    about = "Generate job scripts from a template and a CSV table of parameters"
)]
struct Cli {
    /// Template job script, parameters are written as $$NAME$$
    #[arg(long)]
    template: PathBuf,

    /// CSV file containing one parameter combination per row
    #[arg(long)]
    params: PathBuf,

    /// Directory where generated job scripts are stored
    #[arg(long = "output-dir", alias = "output_dir")]
    output_dir: PathBuf,

    /// YAML file with naming, executor and locking settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Submit generated scripts to the scheduler
    #[arg(long)]
    submit: bool,
}

#[derive(Error, Debug)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Parameters(#[from] ParameterError),
    #[error(transparent)]
    Mismatch(#[from] ParameterMismatchError),
    #[error(transparent)]
    Allocator(#[from] AllocatorError),
}

/// What a run produced
#[derive(Debug)]
struct Summary {
    written: RangeInclusive<u64>,
    dispatch: Option<DispatchReport>,
}

fn run(cli: &Cli) -> Result<Summary, RunError> {
    let config = match cli.config {
        Some(ref path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    debug!(config = ?config, "Loaded configuration");

    if config.preflight_checks(cli.submit) {
        return Err(ConfigErrors::FailedPreflight.into());
    }

    // resolve the executor before anything is written
    let executor = if cli.submit {
        Some(Executors::load(&config.executor)?)
    } else {
        None
    };

    let template = Template::load(&cli.template)?;
    debug!(
        lines = template.lines().len(),
        parameters = template.parameters().len(),
        "Loaded template {}",
        cli.template.display()
    );

    let table = ParameterTable::load(&cli.params)?;
    if table.is_empty() {
        warn!(
            "Parameter table {} has no rows, no job files will be written",
            cli.params.display()
        );
    }
    debug!(
        rows = table.len(),
        "Loaded parameter table with columns {}",
        table.columns().join(", ")
    );

    validate(template.parameters(), &table.column_set())?;

    let written = {
        let mut allocator =
            JobFileAllocator::open(&cli.output_dir, config.naming.clone(), config.lock)?;
        info!(
            "Generating {} job files starting at index {}",
            table.len(),
            allocator.next_index()
        );

        allocator.write_all(table.records().map(|record| template.render(&record)))?
    };

    let dispatch = match executor {
        Some(executor) => Some(executor.dispatch(
            &cli.output_dir,
            &config.naming,
            written.clone(),
        )),
        None => {
            info!("Submission is disabled, pass --submit to hand the job files to the scheduler");

            None
        }
    };

    Ok(Summary { written, dispatch })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(summary) => {
            if !summary.written.is_empty() {
                info!(
                    "Job files {}..={} are in {}",
                    summary.written.start(),
                    summary.written.end(),
                    cli.output_dir.display()
                );
            }

            if let Some(report) = summary.dispatch.filter(|report| !report.is_success()) {
                for (index, error) in report.failed.iter() {
                    warn!(index, "Submission failed: {error}");
                }
            }
        }
        Err(error) => {
            error!("{error}");

            let mut source = error.source();
            while let Some(cause) = source {
                error!("caused by: {cause}");
                source = cause.source();
            }

            exit(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn cli(dir: &std::path::Path, template: &str, params: &str) -> Cli {
        fs::write(dir.join("job.sbatch"), template).unwrap();
        fs::write(dir.join("params.csv"), params).unwrap();

        Cli {
            template: dir.join("job.sbatch"),
            params: dir.join("params.csv"),
            output_dir: dir.join("jobs"),
            config: None,
            submit: false,
        }
    }

    #[test]
    fn cli_accepts_underscore_output_flag() {
        let cli = Cli::try_parse_from([
            "onejob",
            "--template",
            "t.sbatch",
            "--params",
            "p.csv",
            "--output_dir",
            "out",
        ])
        .unwrap();

        assert_eq!(cli.output_dir, PathBuf::from("out"));
        assert!(!cli.submit);
        assert!(Cli::try_parse_from(["onejob", "--template", "t.sbatch"]).is_err());
    }

    #[test]
    fn generates_one_file_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(
            dir.path(),
            "echo $$NAME$$\nsleep $$TIME$$\n",
            "NAME,TIME\na,1\nb,2\n",
        );

        let summary = run(&cli).unwrap();

        assert_eq!(summary.written, 1..=2);
        assert!(summary.dispatch.is_none());
        assert_eq!(
            fs::read_to_string(dir.path().join("jobs/temp_00001.sbatch")).unwrap(),
            "echo a\nsleep 1\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("jobs/temp_00002.sbatch")).unwrap(),
            "echo b\nsleep 2\n"
        );
    }

    #[test]
    fn mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(
            dir.path(),
            "echo $$NAME$$\nsleep $$TIME$$\n",
            "NAME,TIME,EXTRA\na,1,x\n",
        );

        assert!(matches!(run(&cli), Err(RunError::Mismatch(error)) if error.extra == ["EXTRA"]));
        assert!(!dir.path().join("jobs").exists());
    }

    #[test]
    fn duplicate_parameter_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(dir.path(), "echo $$NAME$$\necho $$NAME$$\n", "NAME\na\n");

        assert!(matches!(run(&cli), Err(RunError::Template(_))));
        assert!(!dir.path().join("jobs").exists());
    }

    #[test]
    fn literal_template_is_copied_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(dir.path(), "#!/bin/bash\nhostname\n", "");

        // a table without columns can't be expressed as CSV rows, so only the header is empty
        let summary = run(&cli).unwrap();
        assert!(summary.written.is_empty());

        let template = Template::parse("#!/bin/bash\nhostname\n").unwrap();
        let table = ParameterTable::new(Vec::new(), vec![Vec::new(); 3]).unwrap();
        validate(template.parameters(), &table.column_set()).unwrap();

        let mut allocator =
            JobFileAllocator::open(&cli.output_dir, RunConfig::default().naming, true).unwrap();
        let written = allocator
            .write_all(table.records().map(|record| template.render(&record)))
            .unwrap();

        assert_eq!(written, 1..=3);
        for index in written {
            assert_eq!(
                fs::read_to_string(allocator.path_for(index)).unwrap(),
                "#!/bin/bash\nhostname\n"
            );
        }
    }
}
