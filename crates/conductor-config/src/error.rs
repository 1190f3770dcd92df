//! Configuration errors.
//!
//! Every variant is fatal for a run: configuration problems abort before any
//! handler is acquired or dispatched.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while locating, reading, or validating the handler document.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found: {}", path.display())]
    FileNotFound {
        /// Path that was requested.
        path: PathBuf,
    },

    /// No candidate configuration file exists in the working directory.
    #[error(
        "no configuration file found in {}; create conductor.yaml or add a [conductor] section to a TOML file",
        directory.display()
    )]
    NoConfigFile {
        /// Directory that was searched.
        directory: PathBuf,
    },

    /// The file extension is neither YAML nor TOML.
    #[error("unsupported configuration format: {}", path.display())]
    UnsupportedFormat {
        /// Offending path.
        path: PathBuf,
    },

    /// Reading the document failed.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The document is not valid YAML or TOML.
    #[error("failed to parse {}: {message}", path.display())]
    Parse {
        /// Path being parsed.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// The document lacks the conductor section.
    #[error("{}: '{section}' section not found", path.display())]
    MissingSection {
        /// Path of the document.
        path: PathBuf,
        /// Section that was expected.
        section: &'static str,
    },

    /// A top-level key of the section has the wrong shape.
    #[error("invalid '{key}' section: {message}")]
    InvalidSection {
        /// Key within the section (`handlers` or `options`).
        key: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// A handler entry is neither a path string nor a mapping, or has bad fields.
    #[error("handlers.{index}: {message}")]
    InvalidEntry {
        /// Zero-based position in the `handlers` list.
        index: usize,
        /// Description of the problem.
        message: String,
    },

    /// A handler mapping declares neither a local path nor a git source.
    #[error("handlers.{index}: need exactly one of 'path' or 'git'")]
    MissingSource {
        /// Zero-based position in the `handlers` list.
        index: usize,
    },

    /// A handler mapping declares both a local path and a git source.
    #[error("handlers.{index}: 'path' and 'git' are mutually exclusive")]
    ConflictingSources {
        /// Zero-based position in the `handlers` list.
        index: usize,
    },

    /// A handler name cannot be used as a staging name.
    #[error("invalid handler name '{name}': {reason}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// Why the name is rejected.
        reason: &'static str,
    },

    /// Two handlers share one name.
    #[error("handler name '{name}' is declared more than once")]
    DuplicateName {
        /// Colliding name.
        name: String,
    },

    /// An `-o key=value` override is malformed.
    #[error("invalid option override '{option}': {message}")]
    InvalidOption {
        /// Raw override text.
        option: String,
        /// Description of the problem.
        message: String,
    },
}
