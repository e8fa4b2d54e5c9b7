//! Error types for the harness
//!
//! Every failure is fatal to the run; variants keep enough context to say
//! which tool, file or program was involved.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Harness error types
#[derive(Error, Debug)]
pub enum Error {
    /// A program of the matrix could not be generated or stamped
    #[error("program generation failed for {program}")]
    Generation {
        /// Program identifier (`{data_structure}_{iteration}_{grammar}`)
        program: String,
        /// Underlying IO cause
        #[source]
        source: std::io::Error,
    },

    /// An external tool could not be launched at all
    #[error("failed to launch `{program}`")]
    Spawn {
        /// Program that was invoked
        program: String,
        /// Underlying IO cause
        #[source]
        source: std::io::Error,
    },

    /// A file some tool was expected to produce is not there
    #[error("expected output {} is missing or unreadable", path.display())]
    MissingOutput {
        /// Path that was read
        path: PathBuf,
        /// Underlying IO cause
        #[source]
        source: std::io::Error,
    },

    /// hyperfine export without a usable `results[0].mean`
    #[error("malformed benchmark export {}: {reason}", path.display())]
    MalformedExport {
        /// Export file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Text that should have been a number
    #[error("could not parse `{input}` as a number")]
    ParseNumber {
        /// Offending text
        input: String,
    },

    /// Pass-timing report without the marker line
    #[error("no line containing `{marker}` in tool output")]
    MarkerNotFound {
        /// Marker that was searched for
        marker: &'static str,
    },

    /// `size` output without a second line
    #[error("`size` report has no text-segment row")]
    MalformedSizeReport,

    /// Required tool not found on PATH
    #[error("required tool `{0}` not found on PATH")]
    ToolNotFound(String),

    /// Invalid experiment configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
