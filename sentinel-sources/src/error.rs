use thiserror::Error;

/// Errors surfaced while registering or running an observation source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// An endpoint or watcher id was not found.
    #[error("unknown source id: {0}")]
    NotFound(String),

    /// A `regex:`-prefixed pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The underlying compile error.
        source: regex::Error,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}
