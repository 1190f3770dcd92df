//! Staging of acquired sources and lazy loading of handler units.
//!
//! [`Stager::stage`] copies an [`AcquiredSource`] into the workspace's
//! private handlers root under the handler's logical name, so staged code
//! never lives next to the host's own files. The resulting [`StagedUnit`] is
//! wrapped in a [`LoadedHandler`], which asks the unit to describe itself at
//! most once, on the first function or condition lookup.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use conductor_config::{ConditionSpec, HandlerDescriptor};
use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::acquire::AcquiredSource;
use crate::error::{StageError, UnitError};
use crate::manifest::UnitManifest;
use crate::protocol::UnitDescription;
use crate::runner::UnitExecutor;

const LOADER_TARGET: &str = "conductor_handlers::loader";

/// A handler copied into the staged root, with the command that starts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUnit {
    name: String,
    root: PathBuf,
    program: PathBuf,
    args: Vec<OsString>,
}

impl StagedUnit {
    /// Describes an already staged unit.
    #[must_use]
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Sets the arguments passed to the program.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Logical handler name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Staged file or package directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Program executed to run the unit.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub const fn args(&self) -> &[OsString] {
        self.args.as_slice()
    }
}

/// Copies acquired sources into a private root.
#[derive(Debug, Clone)]
pub struct Stager {
    root: PathBuf,
}

impl Stager {
    /// Stages into `root`, which must already exist.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root that units are staged into.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies `source` into the root as `name`.
    ///
    /// A single file becomes `<root>/<name>.<ext>` and is its own
    /// entrypoint. A directory becomes `<root>/<name>/`, replacing any
    /// previous copy wholesale, and is started as its manifest describes.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] when copying fails, the package manifest is
    /// invalid, or the entrypoint is missing.
    pub fn stage(&self, source: &AcquiredSource, name: &str) -> Result<StagedUnit, StageError> {
        let unit = if source.is_file() {
            self.stage_file(source.path(), name)?
        } else {
            self.stage_package(source.path(), name)?
        };
        debug!(
            target: LOADER_TARGET,
            handler = name,
            source = %source.path().display(),
            staged = %unit.root().display(),
            "handler staged"
        );
        Ok(unit)
    }

    fn stage_file(&self, source: &Path, name: &str) -> Result<StagedUnit, StageError> {
        let mut file_name = OsString::from(name);
        if let Some(ext) = source.extension() {
            file_name.push(".");
            file_name.push(ext);
        }
        let target = self.root.join(file_name);
        fs::copy(source, &target).map_err(|err| io_error(name, &target, err))?;
        Ok(StagedUnit::new(name, &target, &target))
    }

    fn stage_package(&self, source: &Path, name: &str) -> Result<StagedUnit, StageError> {
        let target = self.root.join(name);
        if target.exists() {
            fs::remove_dir_all(&target).map_err(|err| io_error(name, &target, err))?;
        }
        copy_tree(source, &target).map_err(|(path, err)| io_error(name, &path, err))?;

        let manifest = UnitManifest::load(name, &target)?;
        let entrypoint = target.join(manifest.entrypoint());
        if !entrypoint.is_file() {
            return Err(StageError::MissingEntrypoint {
                name: name.to_owned(),
                path: entrypoint,
            });
        }
        let unit = match manifest.interpreter() {
            Some(interpreter) => {
                let mut args = vec![entrypoint.into_os_string()];
                args.extend(manifest.args().iter().map(OsString::from));
                StagedUnit::new(name, &target, interpreter).with_args(args)
            }
            None => StagedUnit::new(name, &target, entrypoint).with_args(manifest.args()),
        };
        Ok(unit)
    }
}

fn copy_tree(source: &Path, target: &Path) -> Result<(), (PathBuf, std::io::Error)> {
    fs::create_dir_all(target).map_err(|err| (target.to_path_buf(), err))?;
    let entries = fs::read_dir(source).map_err(|err| (source.to_path_buf(), err))?;
    for item in entries {
        let entry = item.map_err(|err| (source.to_path_buf(), err))?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        // Follows symlinks so linked directories are copied as trees.
        let metadata = fs::metadata(&from).map_err(|err| (from.clone(), err))?;
        if metadata.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|err| (to.clone(), err))?;
        }
    }
    Ok(())
}

fn io_error(name: &str, path: &Path, source: std::io::Error) -> StageError {
    StageError::Io {
        name: name.to_owned(),
        path: path.to_path_buf(),
        source: Arc::new(source),
    }
}

/// A staged handler whose unit is described lazily.
#[derive(Debug)]
pub struct LoadedHandler {
    descriptor: HandlerDescriptor,
    unit: StagedUnit,
    description: OnceCell<UnitDescription>,
}

impl LoadedHandler {
    /// Wraps a staged unit; nothing is executed yet.
    #[must_use]
    pub fn new(descriptor: HandlerDescriptor, unit: StagedUnit) -> Self {
        Self {
            descriptor,
            unit,
            description: OnceCell::new(),
        }
    }

    /// Logical handler name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// The staged unit.
    #[must_use]
    pub const fn unit(&self) -> &StagedUnit {
        &self.unit
    }

    /// Returns `true` once the unit has described itself.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.description.get().is_some()
    }

    fn description<E: UnitExecutor + ?Sized>(
        &self,
        executor: &E,
    ) -> Result<&UnitDescription, UnitError> {
        self.description.get_or_try_init(|| {
            debug!(target: LOADER_TARGET, handler = self.name(), "loading handler unit");
            executor.describe(&self.unit)
        })
    }

    /// Looks up `function` in the unit, loading it on first use.
    ///
    /// Returns `Ok(None)` when the unit does not expose the function.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError`] when the unit cannot describe itself.
    pub fn get_function<E: UnitExecutor + ?Sized>(
        &self,
        executor: &E,
        function: &str,
    ) -> Result<Option<String>, UnitError> {
        let description = self.description(executor)?;
        Ok(description
            .has_function(function)
            .then(|| function.to_owned()))
    }

    /// Effective condition for `event`.
    ///
    /// A condition declared in the configuration wins and does not load the
    /// unit. Otherwise the unit's own condition is used; `None` means the
    /// handler always runs.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError`] when the unit cannot describe itself.
    pub fn get_condition<E: UnitExecutor + ?Sized>(
        &self,
        executor: &E,
        event: &str,
    ) -> Result<Option<ConditionSpec>, UnitError> {
        if let Some(declared) = self.descriptor.condition_for(event) {
            return Ok(Some(declared.clone()));
        }
        Ok(self.description(executor)?.condition_for(event).cloned())
    }
}

#[cfg(test)]
mod tests;
