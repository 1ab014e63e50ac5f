use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{} is missing required columns: {}", path.display(), columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    #[error("line {line}: unparseable BookingDate {value:?}")]
    InvalidDate { line: usize, value: String },
}
