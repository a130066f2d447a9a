pub mod tokenizer;

use crate::params::Record;
use itertools::Itertools;
use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokenizer::{tokenize, Segment};
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Parameters {} in line {line} are defined twice", .names.iter().join(", "))]
    DuplicateParameter { line: usize, names: Vec<String> },
    #[error("Failed to read template {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A tokenized job script template
///
/// Every placeholder name occurs exactly once in the whole template, so each
/// parameter is substituted at a single location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    lines: Vec<Vec<Segment>>,
    parameters: BTreeSet<String>,
}

/// Output of a single template/ record substitution, one entry per template line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedScript {
    pub lines: Vec<String>,
}

impl RenderedScript {
    /// full file contents, line terminators are part of the lines
    pub fn contents(&self) -> String {
        self.lines.concat()
    }
}

impl fmt::Display for RenderedScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.lines.iter().try_for_each(|line| f.write_str(line))
    }
}

impl Template {
    /// read and parse a template file
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&source)
    }

    /// Tokenize `source` line by line and collect all placeholder names.
    ///
    /// Fails on the first line that reuses a name, either from a previous line or
    /// from earlier on the same line.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut lines = Vec::new();
        let mut parameters = BTreeSet::new();

        for (number, line) in source.split_inclusive('\n').enumerate() {
            let segments = tokenize(line);
            let mut duplicates = BTreeSet::new();

            for segment in segments.iter() {
                if let Segment::Placeholder(name) = segment {
                    if !parameters.insert(name.clone()) {
                        duplicates.insert(name.clone());
                    }
                }
            }

            if !duplicates.is_empty() {
                let names = duplicates.into_iter().collect_vec();
                error!(line = number + 1, ?names, "Template reuses parameters");

                return Err(TemplateError::DuplicateParameter {
                    line: number + 1,
                    names,
                });
            }

            lines.push(segments);
        }

        debug!(
            lines = lines.len(),
            "Parsed template with parameters {}",
            parameters.iter().join(", ")
        );

        Ok(Self { lines, parameters })
    }

    /// all placeholder names used in the template
    pub fn parameters(&self) -> &BTreeSet<String> {
        &self.parameters
    }

    pub fn lines(&self) -> &[Vec<Segment>] {
        &self.lines
    }

    /// Substitute every placeholder with its value from `record`.
    ///
    /// Literal text passes through unchanged. A placeholder without a value in
    /// `record` is kept in its `$$NAME$$` form.
    pub fn render(&self, record: &Record) -> RenderedScript {
        let lines = self
            .lines
            .iter()
            .map(|segments| {
                segments
                    .iter()
                    .map(|segment| match segment {
                        Segment::Literal(text) => text.clone(),
                        Segment::Placeholder(name) => match record.get(name) {
                            Some(value) => value.clone(),
                            None => segment.source(),
                        },
                    })
                    .collect::<String>()
            })
            .collect();

        RenderedScript { lines }
    }
}
