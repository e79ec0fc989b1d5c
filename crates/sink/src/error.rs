use std::path::PathBuf;

/// Failures appending records to a sink file.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// File names must be a single path component.
    #[error("Invalid sink file name '{0}'")]
    InvalidName(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A record's fields do not match the header already established for the file.
    #[error(
        "Record does not match header of {}: missing {missing:?}, unexpected {unexpected:?}",
        path.display()
    )]
    SchemaMismatch {
        path: PathBuf,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// The blocking writer task panicked or was cancelled.
    #[error("Sink writer for {} failed: {message}", path.display())]
    Writer { path: PathBuf, message: String },
}
