use serde::{Deserialize, Serialize};

/// File name convention for generated job scripts: `<prefix><zero padded index>.<extension>`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct NamingScheme {
    pub prefix: String,
    // minimum number of digits, larger indices just grow wider
    pub width: usize,
    // without the leading dot
    pub extension: String,
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self {
            prefix: String::from("temp_"),
            width: 5,
            extension: String::from("sbatch"),
        }
    }
}

/// What a directory entry's name means under a `NamingScheme`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFileName {
    // not a generated job file
    Unrelated,
    Index(u64),
    // has prefix and extension, but no valid index in between
    Malformed,
}

impl NamingScheme {
    pub fn file_name(&self, index: u64) -> String {
        format!(
            "{}{:0width$}.{}",
            self.prefix,
            index,
            self.extension,
            width = self.width
        )
    }

    pub fn classify(&self, file_name: &str) -> JobFileName {
        let Some(body) = file_name
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(self.extension.as_str()))
            .and_then(|rest| rest.strip_suffix('.'))
        else {
            return JobFileName::Unrelated;
        };

        if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
            return JobFileName::Malformed;
        }

        // only overflow can fail here
        body.parse()
            .map_or(JobFileName::Malformed, JobFileName::Index)
    }
}
