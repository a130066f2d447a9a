use itertools::Itertools;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::error;

/// map of placeholder name -> value for a single generated script
pub type Record = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("Failed to read parameter table {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse parameter table")]
    Csv(#[from] csv::Error),
    #[error("Column {0} is defined more than once")]
    DuplicateColumn(String),
    #[error("Row {row} has {found} values but the header has {expected} columns")]
    RowLength {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// Template parameters and table columns differ
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Parameters in template and table do not match (missing columns: [{}], unused columns: [{}])",
    .missing.iter().join(", "),
    .extra.iter().join(", ")
)]
pub struct ParameterMismatchError {
    /// template parameters without a column
    pub missing: Vec<String>,
    /// columns without a template parameter
    pub extra: Vec<String>,
}

/// Ordered table of parameter combinations, one row per generated script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ParameterTable {
    /// build a table from a header and rows of equal length
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, ParameterError> {
        let mut seen = BTreeSet::new();

        for column in columns.iter() {
            if !seen.insert(column.as_str()) {
                error!(column = column.as_str(), "Duplicate column in parameter table");

                return Err(ParameterError::DuplicateColumn(column.clone()));
            }
        }

        for (number, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ParameterError::RowLength {
                    row: number + 1,
                    found: row.len(),
                    expected: columns.len(),
                });
            }
        }

        Ok(Self { columns, rows })
    }

    /// load a CSV file with a header row
    pub fn load(path: &Path) -> Result<Self, ParameterError> {
        let file = File::open(path).map_err(|source| ParameterError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_reader(file)
    }

    /// parse CSV data with a header row from any reader
    pub fn from_reader<R: Read>(input: R) -> Result<Self, ParameterError> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(input);
        let columns = reader
            .headers()?
            .iter()
            .map(str::to_owned)
            .collect_vec();

        let rows = reader
            .records()
            .map(|record| record.map(|record| record.iter().map(str::to_owned).collect_vec()))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_set(&self) -> BTreeSet<String> {
        self.columns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// records in table order
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect()
        })
    }
}

/// Succeeds iff the template's parameters and the table's columns are the same set
pub fn validate(
    parameters: &BTreeSet<String>,
    columns: &BTreeSet<String>,
) -> Result<(), ParameterMismatchError> {
    if parameters == columns {
        return Ok(());
    }

    let mismatch = ParameterMismatchError {
        missing: parameters.difference(columns).cloned().collect(),
        extra: columns.difference(parameters).cloned().collect(),
    };
    error!(
        missing = ?mismatch.missing,
        extra = ?mismatch.extra,
        "Parameters in template and table do not match"
    );

    Err(mismatch)
}
