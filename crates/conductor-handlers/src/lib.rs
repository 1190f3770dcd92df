//! Handler acquisition, staging, and event dispatch for conductor.
//!
//! The `conductor-handlers` crate is the engine behind the `conductor`
//! binary. It turns the [`HandlerDescriptor`](conductor_config::HandlerDescriptor)
//! list from the configuration document into an ordered [`HandlerRegistry`],
//! then dispatches one CI event across it.
//!
//! # Architecture
//!
//! - The [`Workspace`] owns the per-run temporary tree and points at the
//!   persistent cache root.
//! - The [`Acquirer`] resolves each descriptor to an on-disk source. Local
//!   paths are used in place; git sources are fetched once per
//!   `(origin, revision)` through a [`CommandRunner`].
//! - The [`Stager`] copies sources into the workspace's private handlers root
//!   and yields [`LoadedHandler`] values that describe their unit lazily.
//! - The [`Dispatcher`] walks the registry in order: condition check,
//!   function lookup, invocation through a [`UnitExecutor`], and recording in
//!   the [`ResponseLog`]. Skips are soft; failures stop the pass.
//!
//! Units are short-lived child processes speaking single-line JSON over
//! stdio (see [`protocol`] and [`process`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use conductor_config::ConfigDocument;
//! use conductor_handlers::{
//!     Acquirer, Dispatcher, HandlerRegistry, ProcessExecutor, RunSettings, Stager,
//!     SystemCommandRunner, Workspace,
//! };
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = ConfigDocument::load(Path::new("conductor.yaml"))?;
//! let workspace = Workspace::create("/tmp/conductor-cache", None)?;
//! let mut acquirer = Acquirer::new(&workspace, SystemCommandRunner);
//! let stager = Stager::new(workspace.handlers_root());
//! let registry = HandlerRegistry::build(document.handlers(), &mut acquirer, &stager)?;
//!
//! let mut dispatcher = Dispatcher::new(registry, ProcessExecutor::new("."));
//! dispatcher.dispatch(&RunSettings::default(), None, None)?;
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod command;
pub mod condition;
pub mod context;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod response;
pub mod runner;
pub mod workspace;

#[cfg(test)]
mod tests;

pub use self::acquire::{AcquiredSource, Acquirer};
pub use self::command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use self::context::{EventFacts, RunContext, RunSettings};
pub use self::error::{
    AcquisitionError, DispatchError, ProcessError, RegistryError, ResponseError, StageError,
    StatusError, UnitError, WorkspaceError,
};
pub use self::loader::{LoadedHandler, StagedUnit, Stager};
pub use self::process::ProcessExecutor;
pub use self::protocol::{InvokeOutcome, UnitDescription, UnitRequest};
pub use self::registry::HandlerRegistry;
pub use self::response::{DispatchResult, ResponseLog};
pub use self::runner::{CheckConclusion, Dispatcher, StatusReporter, UnitExecutor};
pub use self::workspace::Workspace;
