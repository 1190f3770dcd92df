//! Domain errors raised by the dispatch engine.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! so every error stays `Clone`, `Send`, and `Sync`.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Failure of an external command run through a
/// [`CommandRunner`](crate::command::CommandRunner).
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// The program could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        /// Program that was executed.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The program ran but exited unsuccessfully.
    #[error("'{program}' exited with status {}: {}", describe_status(*status), stderr.trim())]
    Failed {
        /// Program that was executed.
        program: String,
        /// Exit code, absent when the process was killed by a signal.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
}

fn describe_status(status: Option<i32>) -> String {
    status.map_or_else(|| String::from("unknown"), |code| code.to_string())
}

/// Errors raised while creating or tearing down the [`Workspace`](crate::workspace::Workspace).
#[derive(Debug, Clone, Error)]
pub enum WorkspaceError {
    /// A workspace directory could not be created or removed.
    #[error("workspace directory {}: {source}", path.display())]
    Io {
        /// Directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Errors raised while materialising a handler's source.
#[derive(Debug, Clone, Error)]
pub enum AcquisitionError {
    /// A local source path does not exist.
    #[error("handler source not found: {}", path.display())]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// A git command failed while fetching a revision.
    #[error("failed to fetch '{revision}' from {origin}: {source}")]
    Fetch {
        /// Declared origin URL.
        origin: String,
        /// Revision being fetched.
        revision: String,
        /// Command failure.
        #[source]
        source: Box<ProcessError>,
    },

    /// Both an SSH key and a password variable were declared.
    #[error("{origin}: 'key_file' and 'password_env' cannot be combined")]
    AmbiguousAuth {
        /// Declared origin URL.
        origin: String,
    },

    /// A credential hint does not fit the origin or cannot be resolved.
    #[error("{origin}: {message}")]
    InvalidAuth {
        /// Declared origin URL.
        origin: String,
        /// Description of the problem.
        message: String,
    },

    /// The revision cannot be used as a cache directory name.
    #[error("{origin}: invalid revision '{revision}'")]
    InvalidRevision {
        /// Declared origin URL.
        origin: String,
        /// Offending revision.
        revision: String,
    },

    /// The declared subpath is missing from the fetched tree or escapes it.
    #[error("{origin}: subpath '{subpath}' not found in fetched tree")]
    MissingSubpath {
        /// Declared origin URL.
        origin: String,
        /// Declared subpath.
        subpath: String,
    },

    /// Preparing a cache entry failed.
    #[error("cache entry {}: {source}", path.display())]
    Io {
        /// Path being prepared.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Errors raised while copying a handler into the staged root.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// Copying or removing staged files failed.
    #[error("failed to stage handler '{name}' at {}: {source}", path.display())]
    Io {
        /// Handler name.
        name: String,
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The package's `handler.toml` is malformed.
    #[error("handler '{name}' manifest error: {message}")]
    Manifest {
        /// Handler name.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// The entrypoint named by the package does not exist.
    #[error("handler '{name}' entrypoint not found: {}", path.display())]
    MissingEntrypoint {
        /// Handler name.
        name: String,
        /// Expected entrypoint path.
        path: PathBuf,
    },
}

/// Errors raised while building the handler registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A handler's source could not be acquired.
    #[error("handler '{name}': {source}")]
    Acquisition {
        /// Handler name.
        name: String,
        /// Underlying acquisition failure.
        #[source]
        source: AcquisitionError,
    },

    /// A handler could not be staged.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Two handlers share one name.
    #[error("handler '{name}' is already registered")]
    Duplicate {
        /// Colliding name.
        name: String,
    },
}

/// Protocol or process failures of a loaded handler unit.
#[derive(Debug, Error)]
pub enum UnitError {
    /// The unit process could not be started.
    #[error("handler '{name}' failed to start: {source}")]
    Spawn {
        /// Handler name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Communicating with the unit process failed.
    #[error("I/O error communicating with handler '{name}': {source}")]
    Io {
        /// Handler name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The request could not be serialised.
    #[error("failed to serialise request for handler '{name}': {source}")]
    SerializeRequest {
        /// Handler name.
        name: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The unit exited without writing a response line.
    #[error("handler '{name}' produced no response")]
    NoResponse {
        /// Handler name.
        name: String,
    },

    /// The final stdout line is not a valid response.
    #[error("handler '{name}' wrote an invalid response: {message}")]
    InvalidResponse {
        /// Handler name.
        name: String,
        /// Description of the protocol violation.
        message: String,
    },

    /// The unit exited unsuccessfully without a failure response.
    #[error("handler '{name}' exited with status {status}")]
    NonZeroExit {
        /// Handler name.
        name: String,
        /// Exit code, or -1 when killed by a signal.
        status: i32,
    },
}

/// Hard stops of a dispatch pass.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler reported a failure.
    #[error("{handler}: {event} failed: {message}")]
    Failed {
        /// Handler that failed.
        handler: String,
        /// Event being dispatched.
        event: String,
        /// Message reported by the handler.
        message: String,
    },

    /// A handler cancelled the run.
    #[error("{handler}: {event} cancelled: {message}")]
    Cancelled {
        /// Handler that cancelled.
        handler: String,
        /// Event being dispatched.
        event: String,
        /// Message reported by the handler.
        message: String,
    },

    /// The handler unit could not be loaded or invoked.
    #[error("{handler}: {event}: {source}")]
    Unit {
        /// Handler whose unit failed.
        handler: String,
        /// Event being dispatched.
        event: String,
        /// Underlying unit failure.
        #[source]
        source: UnitError,
    },
}

impl DispatchError {
    /// Name of the handler that stopped the pass.
    #[must_use]
    pub fn handler(&self) -> &str {
        match self {
            Self::Failed { handler, .. }
            | Self::Cancelled { handler, .. }
            | Self::Unit { handler, .. } => handler,
        }
    }
}

/// Failure reported by a [`StatusReporter`](crate::runner::StatusReporter).
///
/// Status errors are logged and never stop a dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("status report failed: {message}")]
pub struct StatusError {
    /// Description of the failure.
    pub message: String,
}

impl StatusError {
    /// Creates an error with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Lookup failures in the [`ResponseLog`](crate::response::ResponseLog).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// The handler recorded no result during this pass.
    #[error("response for handler '{name}' not found")]
    NotFound {
        /// Handler that was looked up.
        name: String,
    },
}
