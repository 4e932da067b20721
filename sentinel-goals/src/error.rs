use thiserror::Error;

/// Errors raised while loading or evaluating goal definitions.
#[derive(Debug, Error)]
pub enum GoalError {
    /// A goal configuration directory could not be read.
    #[error("failed to read goal config directory {path}")]
    ConfigDir {
        /// The directory that failed to read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A goal file could not be read from disk.
    #[error("failed to read goal file {path}")]
    FileRead {
        /// The file that failed to read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A goal file's top-level YAML structure failed to parse (the
    /// whole file is skipped; individual malformed goals within an
    /// otherwise-valid file are skipped instead, without failing the
    /// rest of the file).
    #[error("failed to parse goal file {path}: {source}")]
    FileParse {
        /// The file that failed to parse.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },
}
